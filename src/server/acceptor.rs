use mio::event::Source;
use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};

use socket2::Socket;

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::os::unix::io::{FromRawFd, IntoRawFd};

/// Internal state of the socket acceptor.
pub struct Acceptor {
    sock: TcpListener,
    local_addr: SocketAddr,
}

impl Acceptor {
    /// Starts listening on a bound socket supplied by the provider, queueing up to `backlog`
    /// connections at the OS level.
    pub fn new(socket: Socket, backlog: usize) -> io::Result<Self> {
        let backlog = if backlog > i32::max_value() as usize {
            i32::max_value()
        } else {
            backlog as i32
        };
        socket.listen(backlog)?;
        socket.set_nonblocking(true)?;

        let sock = TcpListener::from_std(socket.into());
        let local_addr = sock.local_addr()?;
        Ok(Acceptor { sock, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept one pending connection, if there is one.
    pub fn accept(&self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        match self.sock.accept() {
            Ok(pair) => Ok(Some(pair)),
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Give the listening socket back, so that the provider can close it.
    pub fn into_socket(self) -> Socket {
        let fd = self.sock.into_raw_fd();
        // the descriptor was just released by the listener, so it has exactly one owner again
        unsafe { Socket::from_raw_fd(fd) }
    }
}

impl Source for Acceptor {
    fn register(&mut self, registry: &Registry, token: Token, interest: Interest) -> io::Result<()> {
        self.sock.register(registry, token, interest)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.sock.reregister(registry, token, interest)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.sock.deregister(registry)
    }
}
