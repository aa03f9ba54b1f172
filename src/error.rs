use std::fmt;

/// Unified error type for the calparse crate.
#[derive(Debug, Clone)]
pub enum CoreError {
    /// Invalid input provided by the caller.
    InvalidInput(String),
    /// Credential missing or failed verification.
    Unauthorized(String),
    /// Send/receive failure on a client transport session.
    Transport(String),
    /// Broker precondition violation (e.g. publish with no bound destination).
    Broker(String),
    /// Internal error.
    Internal(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            CoreError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            CoreError::Transport(msg) => write!(f, "transport error: {msg}"),
            CoreError::Broker(msg) => write!(f, "broker error: {msg}"),
            CoreError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for CoreError {}

/// Result type alias using [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;
