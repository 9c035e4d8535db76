/// Unwraps a result, or logs what failed and exits the process. Only meant for the outer edges of
/// a program (startup, configuration), never for anything inside the event loop.
#[macro_export]
macro_rules! unwrap {
    ($result:expr) => {
        $crate::unwrap!($result, "startup")
    };
    ($result:expr, $what:expr) => {
        match $result {
            Ok(t) => t,
            Err(e) => {
                error!("Aborting, {} failed: {}", $what, e);
                ::std::process::exit(1)
            }
        }
    };
}
