//! The event loop.
//!
//! One thread waits for read readiness on the listening socket and on every client socket at once.
//! Each wake-up either accepts a single new connection, or reads from every ready client (lowest
//! slot first) and hands the bytes to the service.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::service::{Action, Service, SocketProvider};

use std::collections::BTreeSet;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::mem;
use std::time::Duration;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Registry, Token};

mod acceptor;
use self::acceptor::Acceptor;

pub mod pump;
use self::pump::Received;

mod shutdown;
pub use self::shutdown::ShutdownHandle;
use self::shutdown::{ShutdownController, SIGNAL, WAKE};

mod table;
pub use self::table::{ConnectionTable, PeerInfo};

const LISTENER: Token = Token(0);

/// Internal state of the entire server.
pub struct Server<P, S> {
    events: Events,
    poll: Poll,
    config: Config,
    provider: P,
    service: S,
    connections: ConnectionTable,
    shutdown: ShutdownController,
    acceptor: Option<Acceptor>,
    accept_failing: bool,
}

impl<P: SocketProvider, S: Service> Server<P, S> {
    /// Create a new server. Nothing is bound yet, that happens in `listen` or `run`.
    pub fn new(config: Config, provider: P, service: S) -> Result<Self> {
        config.validate()?;
        let events = Events::with_capacity(config.events_capacity);
        let poll = Poll::new()?;
        let shutdown = ShutdownController::new(poll.registry())?;
        let connections = ConnectionTable::with_capacity(config.backlog);

        Ok(Server {
            events,
            poll,
            config,
            provider,
            service,
            connections,
            shutdown,
            acceptor: None,
            accept_failing: false,
        })
    }

    /// A handle that stops the server the same way SIGINT or SIGTERM do.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.handle()
    }

    /// The address clients can connect to, once the server is listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.acceptor.as_ref().map(Acceptor::local_addr)
    }

    /// Acquire the listening socket from the provider and start listening on it. `run` does this
    /// itself when it has not been done yet; calling it first lets the caller learn the address
    /// before any client is served.
    pub fn listen(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }

        let socket = match self.provider.establish_socket() {
            Ok(socket) => socket,
            Err(e) => return Err(self.report(Error::Establish(e))),
        };
        let mut acceptor = match Acceptor::new(socket, self.config.backlog) {
            Ok(acceptor) => acceptor,
            Err(e) => return Err(self.report(Error::Establish(e))),
        };
        if let Err(e) = self.poll.registry().register(&mut acceptor, LISTENER, Interest::READABLE) {
            self.provider.close_socket(acceptor.into_socket());
            return Err(self.report(Error::Establish(e)));
        }

        let addr = acceptor.local_addr();
        info!("Listening on {} with room for {} clients", addr, self.config.backlog);
        self.acceptor = Some(acceptor);
        Ok(addr)
    }

    /// Serve clients until a termination signal (or a shutdown handle) stops the server. Every
    /// client connection and the listening socket are closed before this returns.
    ///
    /// Fails straight away if no listening socket can be established, after reporting the failure
    /// to the service.
    pub fn run(&mut self) -> Result<()> {
        self.listen()?;
        let result = self.serve();
        self.close_everything();
        result
    }

    fn serve(&mut self) -> Result<()> {
        // mio only reports changes, so remember what is still ready between iterations
        let mut listener_ready = false;
        let mut ready = BTreeSet::new();

        loop {
            if self.shutdown.requested() {
                return Ok(());
            }

            let timeout = if listener_ready || !ready.is_empty() {
                Some(Duration::from_secs(0))
            } else {
                self.config.poll_timeout()
            };

            match self.poll.poll(&mut self.events, timeout) {
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                result => throw!(result),
            }

            if self.events.is_empty() && !listener_ready && ready.is_empty() {
                trace!("Poll timed out with nothing ready");
                continue;
            }

            for event in self.events.iter() {
                match event.token() {
                    LISTENER => listener_ready = true,
                    SIGNAL | WAKE => self.shutdown.notice(event.token()),
                    Token(n) => {
                        ready.insert(n - 1);
                    }
                }
            }

            if self.shutdown.requested() {
                return Ok(());
            }

            if listener_ready {
                listener_ready = self.accept();
                continue;
            }

            // a slot that produced data may have more (or a hang up) behind it that mio will not
            // report again, so it stays ready until a read comes back empty
            for index in mem::take(&mut ready) {
                if self.service_client(index) {
                    ready.insert(index);
                }
            }
        }
    }

    /// Accept one pending connection. Returns whether the listener may still have more pending.
    fn accept(&mut self) -> bool {
        let accepted = match self.acceptor {
            Some(ref acceptor) => acceptor.accept(),
            None => return false,
        };
        let still_ready = listener_still_ready(&accepted);
        let (mut stream, addr) = match accepted {
            Ok(Some(pair)) => {
                self.accept_failing = false;
                pair
            }
            Ok(None) => return still_ready,
            Err(ref e) if e.kind() == ErrorKind::ConnectionAborted => return still_ready,
            Err(ref e) if e.kind() == ErrorKind::Interrupted => return still_ready,
            Err(e) => {
                if !self.accept_failing {
                    warn!("Could not accept socket, will keep trying: {}", e);
                    self.accept_failing = true;
                }
                return still_ready;
            }
        };

        let index = match self.connections.try_allocate() {
            Some(index) => index,
            None => {
                // drop the connection rather than leave it queued in the kernel
                drop(stream);
                let err = Error::BacklogReached(self.connections.capacity());
                warn!("{}, turned away {}", err, addr);
                self.service.on_error(&err);
                return true;
            }
        };

        let token = Token(index + 1);
        if let Err(e) = self.poll.registry().register(&mut stream, token, Interest::READABLE) {
            warn!("Could not register connection from {}: {}", addr, e);
            return true;
        }
        self.connections.occupy(index, stream, PeerInfo::new(addr));
        debug!(
            "Accepted {} into slot {} ({} of {} in use)",
            addr,
            index,
            self.connections.len(),
            self.connections.capacity()
        );

        let admitted = match self.connections.get_mut(index) {
            Some((_, peer)) => self.service.should_accept_connection(peer),
            None => false,
        };
        if !admitted {
            debug!("Service rejected {}", addr);
            self.close_client(index);
        }

        true
    }

    /// Read whatever a ready client has sent and act on the service's verdict. Returns whether the
    /// client should be read again on the next iteration.
    fn service_client(&mut self, index: usize) -> bool {
        let (close, read_again) = {
            let &mut Server {
                ref mut connections,
                ref mut service,
                ref config,
                ..
            } = self;

            let (stream, peer) = match connections.get_mut(index) {
                Some(slot) => slot,
                None => return false,
            };

            match pump::read(stream, config.read_buffer_size) {
                Ok(Received::Nothing) => (false, false),
                Ok(Received::Closed) => {
                    debug!("{} closed the connection", peer.addr);
                    (true, false)
                }
                Ok(Received::Data { bytes, eof }) => {
                    trace!("Received {} bytes from {}", bytes.len(), peer.addr);
                    let close = match service.handle_received_data(&bytes, peer) {
                        Action::Close => true,
                        Action::Keep => false,
                        Action::Reply(reply) => {
                            match pump::send(stream, &reply, config.write_buffer_size) {
                                Ok(()) => {
                                    trace!("Sent {} bytes to {}", reply.len(), peer.addr);
                                    false
                                }
                                Err(e) => {
                                    warn!("Could not reply to {}: {}", peer.addr, e);
                                    true
                                }
                            }
                        }
                    };
                    let close = close || eof;
                    (close, !close)
                }
                Err(e) => {
                    warn!("Could not read from {}: {}", peer.addr, e);
                    (true, false)
                }
            }
        };

        if close {
            self.close_client(index);
        }
        read_again
    }

    fn close_client(&mut self, index: usize) {
        let &mut Server {
            ref mut connections,
            ref mut service,
            ref poll,
            ..
        } = self;
        connections.release(index, |stream, peer| {
            close_stream(poll.registry(), &mut *service, stream, peer)
        });
    }

    /// Close every client, then hand the listening socket back to the provider.
    fn close_everything(&mut self) {
        for (index, stream) in self.connections.occupied() {
            debug!("Slot {} still open at shutdown ({:?})", index, stream.peer_addr());
        }

        let released = {
            let &mut Server {
                ref mut connections,
                ref mut service,
                ref poll,
                ..
            } = self;
            connections.release_all(|_, stream, peer| {
                close_stream(poll.registry(), &mut *service, stream, peer)
            })
        };

        if let Some(mut acceptor) = self.acceptor.take() {
            if let Err(e) = self.poll.registry().deregister(&mut acceptor) {
                debug!("Could not deregister the listener: {}", e);
            }
            self.provider.close_socket(acceptor.into_socket());
        }
        info!("Server stopped, closed {} client connections", released);
    }

    fn report(&mut self, error: Error) -> Error {
        error!("{}", error);
        self.service.on_error(&error);
        error
    }
}

/// Whether the listener has to be tried again on the next iteration. Only an empty accept queue
/// clears it: mio will not report connections that were already queued when an accept failed.
fn listener_still_ready<T>(accepted: &io::Result<Option<T>>) -> bool {
    match *accepted {
        Ok(None) => false,
        _ => true,
    }
}

fn close_stream<S: Service>(
    registry: &Registry,
    service: &mut S,
    mut stream: TcpStream,
    peer: PeerInfo,
) {
    service.will_close_connection(&peer, &stream);
    if let Err(e) = registry.deregister(&mut stream) {
        debug!("Could not deregister {}: {}", peer.addr, e);
    }
    debug!("Closed connection to {}", peer.addr);
}
