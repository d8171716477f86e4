//! Duplex frame transport abstraction.
//!
//! The session manager never touches a socket directly: it is handed an
//! exclusive send half and an exclusive receive half by a connector, and
//! each half is moved into exactly one task. Implementations adapt
//! whatever streaming-RPC client actually carries the bytes.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub mod memory;
#[cfg(feature = "websocket")]
pub mod websocket;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to establish connection: {0}")]
    Connect(String),
    #[error("transport i/o error: {0}")]
    Io(String),
    /// The service rejected a previously sent event. Fatal to the
    /// session, distinct from plain connection loss.
    #[error("service rejected an event: {0}")]
    Validation(String),
    #[error("transport is closed")]
    Closed,
}

/// Exclusive write half of a duplex connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Exclusive read half of a duplex connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Waits for the next inbound frame. `Ok(None)` is end of stream.
    async fn next_frame(&mut self) -> Result<Option<Bytes>, TransportError>;
}

/// Factory for one duplex connection, split into its two halves.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(
        &self,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError>;
}
