/// Shared error type used across all AgentLink crates.
///
/// Argument and state errors are returned before any side effect takes
/// place; the other variants describe failures of an operation that was
/// already under way.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("network: {0}")]
    Network(String),

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("config: {0}")]
    Config(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::collections::TryReserveError> for Error {
    fn from(e: std::collections::TryReserveError) -> Self {
        Error::OutOfMemory(e.to_string())
    }
}
