//! Channel-backed transport for tests and in-process embedding.
//!
//! [`pair`] returns a connector for the session side and a [`RemoteEnd`]
//! standing in for the service: frames the session sends come out of
//! `recv_frame`, and `send_frame`/`send_error` drive the session's
//! receive loop. Dropping the remote end reads as end of stream.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::{FrameSink, FrameSource, TransportConnector, TransportError};

/// Creates a connected in-memory transport. `capacity` bounds both
/// directions independently.
pub fn pair(capacity: usize) -> (MemoryConnector, RemoteEnd) {
    let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
    let connector = MemoryConnector {
        halves: Mutex::new(Some((
            MemorySink {
                tx: Some(outbound_tx),
            },
            MemorySource { rx: inbound_rx },
        ))),
    };
    let remote = RemoteEnd {
        outbound_rx,
        inbound_tx,
    };
    (connector, remote)
}

/// Connector whose single connection was created by [`pair`].
pub struct MemoryConnector {
    halves: Mutex<Option<(MemorySink, MemorySource)>>,
}

#[async_trait]
impl TransportConnector for MemoryConnector {
    async fn connect(
        &self,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError> {
        let (sink, source) = self
            .halves
            .lock()
            .expect("memory transport lock poisoned")
            .take()
            .ok_or_else(|| TransportError::Connect("memory transport already connected".into()))?;
        Ok((Box::new(sink), Box::new(source)))
    }
}

struct MemorySink {
    tx: Option<mpsc::Sender<Bytes>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx.take();
        Ok(())
    }
}

struct MemorySource {
    rx: mpsc::Receiver<Result<Bytes, TransportError>>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }
}

/// The service side of an in-memory connection.
pub struct RemoteEnd {
    outbound_rx: mpsc::Receiver<Bytes>,
    inbound_tx: mpsc::Sender<Result<Bytes, TransportError>>,
}

impl RemoteEnd {
    /// Next frame the session wrote, or `None` once it closed its sink.
    pub async fn recv_frame(&mut self) -> Option<Bytes> {
        self.outbound_rx.recv().await
    }

    /// Delivers a frame to the session's receive loop.
    pub async fn send_frame(&self, frame: impl Into<Bytes>) {
        let _ = self.inbound_tx.send(Ok(frame.into())).await;
    }

    /// Delivers a transport error to the session's receive loop.
    pub async fn send_error(&self, error: TransportError) {
        let _ = self.inbound_tx.send(Err(error)).await;
    }

    /// Ends the inbound stream while keeping the outbound side readable.
    pub fn finish(self) -> mpsc::Receiver<Bytes> {
        self.outbound_rx
    }
}
