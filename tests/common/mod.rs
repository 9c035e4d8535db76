#![allow(dead_code)]

use socket_server::{Action, Config, PeerInfo, Result, Server, Service, ShutdownHandle, SocketProvider};

use socket2::{Domain, SockAddr, Socket, Type};

use mio::net::TcpStream as MioStream;

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const PATIENCE: Duration = Duration::from_secs(5);

/// Everything the server told the service, in order.
#[derive(Debug, Default)]
pub struct Record {
    pub accepted: Vec<SocketAddr>,
    pub received: Vec<(SocketAddr, Vec<u8>)>,
    pub closed: Vec<SocketAddr>,
    pub errors: Vec<Option<i32>>,
    pub open: usize,
    pub max_open: usize,
}

pub type Shared = Arc<Mutex<Record>>;

type Handler = Box<dyn FnMut(&[u8], &mut PeerInfo) -> Action + Send>;
type Admission = Box<dyn FnMut(&PeerInfo) -> bool + Send>;

pub struct Recorder {
    record: Shared,
    handler: Handler,
    admission: Admission,
}

impl Recorder {
    pub fn new<F>(handler: F) -> Self
    where
        F: FnMut(&[u8], &mut PeerInfo) -> Action + Send + 'static,
    {
        Recorder {
            record: Shared::default(),
            handler: Box::new(handler),
            admission: Box::new(|_| true),
        }
    }

    /// Replies "pong" to "ping", hangs up on "die", stays quiet otherwise.
    pub fn ping_pong() -> Self {
        Recorder::new(|data, _| match data {
            b"ping" => "pong".into(),
            b"die" => Action::Close,
            _ => Action::Keep,
        })
    }

    pub fn echo() -> Self {
        Recorder::new(|data, _| data.into())
    }

    pub fn admitting<F>(mut self, admission: F) -> Self
    where
        F: FnMut(&PeerInfo) -> bool + Send + 'static,
    {
        self.admission = Box::new(admission);
        self
    }

    pub fn record(&self) -> Shared {
        self.record.clone()
    }
}

impl Service for Recorder {
    fn handle_received_data(&mut self, data: &[u8], peer: &mut PeerInfo) -> Action {
        self.record.lock().unwrap().received.push((peer.addr, data.to_vec()));
        (self.handler)(data, peer)
    }

    fn should_accept_connection(&mut self, peer: &mut PeerInfo) -> bool {
        let mut record = self.record.lock().unwrap();
        record.accepted.push(peer.addr);
        record.open += 1;
        record.max_open = record.max_open.max(record.open);
        (self.admission)(peer)
    }

    fn will_close_connection(&mut self, peer: &PeerInfo, _stream: &MioStream) {
        let mut record = self.record.lock().unwrap();
        record.closed.push(peer.addr);
        record.open -= 1;
    }

    fn on_error(&mut self, error: &socket_server::Error) {
        self.record.lock().unwrap().errors.push(error.code());
    }
}

/// Hands over a socket that was bound up front, so the test knows the port before the server runs.
pub struct Prebound {
    socket: Option<Socket>,
    closed: Arc<AtomicBool>,
}

impl SocketProvider for Prebound {
    fn establish_socket(&mut self) -> io::Result<Socket> {
        self.socket
            .take()
            .ok_or_else(|| io::Error::new(ErrorKind::Other, "socket already handed out"))
    }

    fn close_socket(&mut self, socket: Socket) {
        drop(socket);
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct Running {
    pub addr: SocketAddr,
    pub record: Shared,
    pub listener_closed: Arc<AtomicBool>,
    handle: ShutdownHandle,
    thread: JoinHandle<Result<()>>,
}

impl Running {
    pub fn record(&self) -> MutexGuard<Record> {
        self.record.lock().unwrap()
    }

    pub fn handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    /// Wait for the server thread to return from `run`.
    pub fn join(self) -> Result<()> {
        self.thread.join().expect("server thread panicked")
    }

    pub fn stop(self) -> Result<()> {
        self.handle.shutdown().unwrap();
        self.join()
    }
}

pub fn config(backlog: usize) -> Config {
    Config {
        backlog,
        timeout: Some(0.05),
        ..Config::default()
    }
}

/// Run a server on a loopback port in its own thread. Returns once the server is listening.
pub fn start(config: Config, service: Recorder) -> Running {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
    socket.set_reuse_address(true).unwrap();
    let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
    socket.bind(&SockAddr::from(any)).unwrap();
    let bound = socket.local_addr().unwrap().as_socket().unwrap();

    let closed = Arc::new(AtomicBool::new(false));
    let provider = Prebound {
        socket: Some(socket),
        closed: closed.clone(),
    };
    let record = service.record();

    let (tx, rx) = mpsc::channel();
    let thread = thread::spawn(move || {
        let mut server = Server::new(config, provider, service)?;
        server.listen()?;
        let addr = server.local_addr().expect("listening server has an address");
        tx.send((server.shutdown_handle(), addr)).unwrap();
        server.run()
    });
    let (handle, addr) = rx.recv().expect("server failed to start listening");
    assert_eq!(addr, bound);

    Running {
        addr,
        record,
        listener_closed: closed,
        handle,
        thread,
    }
}

pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(PATIENCE)).unwrap();
    stream
}

/// Send a request and read a reply of a known length.
pub fn request(stream: &mut TcpStream, data: &[u8], reply_len: usize) -> Vec<u8> {
    stream.write_all(data).unwrap();
    let mut reply = vec![0; reply_len];
    stream.read_exact(&mut reply).unwrap();
    reply
}

/// The server closed the connection: reading gives end of file (or a reset).
pub fn assert_closed(stream: &mut TcpStream) {
    let mut buf = [0; 16];
    match stream.read(&mut buf) {
        Ok(0) => (),
        Err(ref e) if e.kind() == ErrorKind::ConnectionReset => (),
        Ok(n) => panic!("expected the connection to be closed, got {:?}", &buf[..n]),
        Err(e) => panic!("expected the connection to be closed, got {}", e),
    }
}

pub fn hang_up(stream: TcpStream) {
    stream.shutdown(Shutdown::Both).unwrap();
}

/// Poll the record until `check` holds, failing the test after a few seconds.
pub fn wait_for<F>(record: &Shared, what: &str, check: F)
where
    F: Fn(&Record) -> bool,
{
    let deadline = Instant::now() + PATIENCE;
    loop {
        {
            let record = record.lock().unwrap();
            if check(&record) {
                return;
            }
            if Instant::now() > deadline {
                panic!("gave up waiting for {}: {:?}", what, *record);
            }
        }
        thread::sleep(Duration::from_millis(10));
    }
}
