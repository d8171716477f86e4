//! Caller-visible error taxonomy for the session manager.

use thiserror::Error;

/// Errors surfaced to the caller of a [`crate::Session`].
///
/// `ConnectionLost` and `ProtocolValidationFailed` are fatal to the
/// session; they are also delivered once as the terminal item on the
/// session's item channel. `InvalidState` and `Overflow` are local to
/// the offending call and leave the session running.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("{operation} is illegal: session is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },
    #[error("service rejected the stream: {0}")]
    ProtocolValidationFailed(String),
    #[error("audio pipeline is full")]
    Overflow,
}
