use thiserror::Error;

/// Errors returned by the fallible constructors of this crate.
///
/// Writing a log line never fails; only setting up a sink or a level store can.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),
}
