//! Termination handling.
//!
//! SIGINT and SIGTERM are turned into readiness events on the poll, so a signal only ever wakes
//! the loop up and the actual shutdown runs between two iterations. A `ShutdownHandle` can ask for
//! the same thing from any thread.

use mio::{Interest, Registry, Token, Waker};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_mio::v1_0::Signals;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const SIGNAL: Token = Token(usize::max_value() - 2);
pub const WAKE: Token = Token(usize::max_value() - 1);

/// Asks a running server to close every connection and return from `run`.
#[derive(Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) -> io::Result<()> {
        self.requested.store(true, Ordering::SeqCst);
        self.waker.wake()
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

pub struct ShutdownController {
    signals: Signals,
    handle: ShutdownHandle,
}

impl ShutdownController {
    pub fn new(registry: &Registry) -> io::Result<Self> {
        let mut signals = Signals::new(&[SIGINT, SIGTERM])?;
        registry.register(&mut signals, SIGNAL, Interest::READABLE)?;

        let handle = ShutdownHandle {
            requested: Arc::new(AtomicBool::new(false)),
            waker: Arc::new(Waker::new(registry, WAKE)?),
        };

        Ok(ShutdownController { signals, handle })
    }

    pub fn handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    /// Handle a readiness event on one of the shutdown tokens.
    pub fn notice(&mut self, token: Token) {
        if token == SIGNAL {
            for signal in self.signals.pending() {
                info!("Received signal {}, shutting down", signal);
                self.handle.requested.store(true, Ordering::SeqCst);
            }
        }
    }

    pub fn requested(&self) -> bool {
        self.handle.is_requested()
    }
}
