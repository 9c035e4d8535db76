//! The hooks a concrete server plugs into the event loop.
//!
//! A `SocketProvider` hands over the listening socket and takes it back at the end, and a
//! `Service` decides what happens to each connection and to each chunk of received data. Both are
//! called synchronously from the loop thread, so they must not block for long.

use mio::net::TcpStream;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use std::io;
use std::net::SocketAddr;

use crate::error::Error;
use crate::server::PeerInfo;

/// What to do with a connection after the service has seen its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Close the connection without replying.
    Close,
    /// Send these bytes back and keep the connection open.
    Reply(Vec<u8>),
    /// Keep the connection open and send nothing.
    Keep,
}

impl From<Vec<u8>> for Action {
    fn from(bytes: Vec<u8>) -> Self {
        Action::Reply(bytes)
    }
}

impl<'a> From<&'a [u8]> for Action {
    fn from(bytes: &'a [u8]) -> Self {
        Action::Reply(bytes.to_vec())
    }
}

impl<'a> From<&'a str> for Action {
    fn from(text: &'a str) -> Self {
        Action::Reply(text.as_bytes().to_vec())
    }
}

impl From<String> for Action {
    fn from(text: String) -> Self {
        Action::Reply(text.into_bytes())
    }
}

impl From<Option<Vec<u8>>> for Action {
    fn from(reply: Option<Vec<u8>>) -> Self {
        reply.map_or(Action::Keep, Action::Reply)
    }
}

impl From<()> for Action {
    fn from(_: ()) -> Self {
        Action::Keep
    }
}

/// Application behaviour of a server.
pub trait Service {
    /// Called with every batch of bytes read from a client. The peer metadata can be rewritten to
    /// carry state between calls for the same connection.
    fn handle_received_data(&mut self, data: &[u8], peer: &mut PeerInfo) -> Action;

    /// Decide whether a freshly accepted client is kept.
    fn should_accept_connection(&mut self, _peer: &mut PeerInfo) -> bool {
        true
    }

    /// Called right before a client socket is closed, whatever the reason.
    fn will_close_connection(&mut self, _peer: &PeerInfo, _stream: &TcpStream) {}

    /// Called for the conditions the loop recovers from (or gives up on) by itself.
    fn on_error(&mut self, _error: &Error) {}
}

/// Supplies the listening socket. The socket must be bound; the server starts listening on it.
pub trait SocketProvider {
    fn establish_socket(&mut self) -> io::Result<Socket>;

    /// Takes the listening socket back once the server is done with it.
    fn close_socket(&mut self, socket: Socket) {
        drop(socket);
    }
}

/// The stock provider: a TCP socket bound to a fixed address, with address reuse enabled.
#[derive(Debug, Clone)]
pub struct TcpProvider {
    addr: SocketAddr,
}

impl TcpProvider {
    pub fn new(addr: SocketAddr) -> Self {
        TcpProvider { addr }
    }
}

impl SocketProvider for TcpProvider {
    fn establish_socket(&mut self) -> io::Result<Socket> {
        let socket = Socket::new(Domain::for_address(self.addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(self.addr))?;
        Ok(socket)
    }

    fn close_socket(&mut self, socket: Socket) {
        debug!("Closing listening socket bound to {}", self.addr);
        drop(socket);
    }
}
