//! Error handling within the socket server.
//!
//! All errors boil down to a single error enum that tracks its cause, and forwards its display
//! implementation with some context. Two of the variants are the recognised server conditions
//! that get reported to `Service::on_error`, and carry a numeric code for that purpose.
//!
//! As well as this enum, a macro throw has been defined - similar to try! - that logs errors at
//! the warn level and then propagates them up.

use std::io;
use std::result;

/// Code reported when the socket provider could not produce a listening socket.
pub const ERROR_CODE_SOCKET_ESTABLISHMENT: i32 = -102;

/// Code reported when a connection arrives while every slot is occupied.
pub const ERROR_CODE_BACKLOG_REACHED: i32 = 103;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Establish(err: io::Error) {
            display("No connection established: {}", err)
            source(err)
        }
        BacklogReached(capacity: usize) {
            display("Too many connections (all {} slots in use)", capacity)
        }
        InvalidConfig(reason: String) {
            display("Invalid configuration: {}", reason)
        }
        Toml(err: toml::de::Error) {
            display("Config parse error: {}", err)
            source(err)
            from()
        }
        Io(err: io::Error) {
            display("IO error: {}", err)
            source(err)
            from()
        }
    }
}

impl Error {
    /// The numeric code for the conditions that are surfaced to the service, if this is one.
    pub fn code(&self) -> Option<i32> {
        match *self {
            Error::Establish(_) => Some(ERROR_CODE_SOCKET_ESTABLISHMENT),
            Error::BacklogReached(_) => Some(ERROR_CODE_BACKLOG_REACHED),
            _ => None,
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! throw {
    ($result:expr) =>  {
        match $result {
            Ok(t) => t,
            Err(e) => {
                let e: $crate::Error = e.into();
                warn!("{}", e);
                return Err(e);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognised_conditions_carry_codes() {
        let establish = Error::Establish(io::Error::new(io::ErrorKind::AddrInUse, "taken"));
        assert_eq!(establish.code(), Some(-102));
        assert_eq!(Error::BacklogReached(4).code(), Some(103));
        assert_eq!(Error::InvalidConfig("nope".into()).code(), None);
        assert_eq!(Error::from(io::Error::new(io::ErrorKind::Other, "x")).code(), None);
    }

    #[test]
    fn display_includes_context() {
        let err = Error::BacklogReached(10);
        assert_eq!(err.to_string(), "Too many connections (all 10 slots in use)");
    }

    #[test]
    fn throw_logs_and_propagates() {
        fn fails() -> Result<u8> {
            let value: u8 = throw!(Err::<u8, io::Error>(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "gone"
            )));
            Ok(value)
        }

        match fails() {
            Err(Error::Io(ref err)) => assert_eq!(err.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected {:?}", other),
        }
    }
}
