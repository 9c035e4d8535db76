//! A single-threaded reactor core for TCP servers.
//!
//! A `Server` owns one listening socket and a fixed number of client slots. It waits for read
//! readiness on all of them, accepts new clients while there is room, and passes whatever clients
//! send to a `Service`, whose `Action` decides whether to reply, stay quiet or hang up. SIGINT and
//! SIGTERM close everything down cleanly.

#[macro_use]
extern crate log;

#[macro_use]
extern crate quick_error;

extern crate serde;

#[macro_use]
extern crate serde_derive;

extern crate toml;

extern crate mio;

extern crate socket2;

#[macro_use]
mod result;

#[macro_use]
mod error;
pub use error::{Error, Result, ERROR_CODE_BACKLOG_REACHED, ERROR_CODE_SOCKET_ESTABLISHMENT};

mod config;
pub use config::Config;

mod service;
pub use service::{Action, Service, SocketProvider, TcpProvider};

pub mod server;
pub use server::{PeerInfo, Server, ShutdownHandle};
