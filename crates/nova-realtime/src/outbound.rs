//! Single-writer send path.
//!
//! One task owns the transport sink; producers enqueue commands over a
//! channel. Relative order is preserved per producer, and a batch is
//! written contiguously, never interleaved with other submissions. A
//! write failure closes the lifecycle and surfaces `ConnectionLost`
//! through the item channel.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use nova_realtime_types::events::{ClientEvent, encode_client_event};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::content::Deliverer;
use crate::error::SessionError;
use crate::lifecycle::Lifecycle;
use crate::transport::FrameSink;

pub(crate) enum Command {
    Send(ClientEvent),
    SendBatch(Vec<ClientEvent>),
    Close,
}

/// Cheap handle for enqueuing onto the send path.
#[derive(Clone)]
pub(crate) struct SequencerHandle {
    tx: mpsc::Sender<Command>,
}

impl SequencerHandle {
    pub async fn send(&self, event: ClientEvent) -> Result<(), SessionError> {
        self.submit(Command::Send(event)).await
    }

    /// Enqueues a sequence of envelopes as one contiguous unit.
    pub async fn send_batch(&self, events: Vec<ClientEvent>) -> Result<(), SessionError> {
        self.submit(Command::SendBatch(events)).await
    }

    /// Asks the writer to flush queued commands and close the sink.
    pub async fn close(&self) {
        let _ = self.tx.send(Command::Close).await;
    }

    async fn submit(&self, command: Command) -> Result<(), SessionError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| SessionError::ConnectionLost("send path is closed".into()))
    }
}

pub(crate) fn spawn(
    mut sink: Box<dyn FrameSink>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    deliverer: Deliverer,
    queue_depth: usize,
) -> (SequencerHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(queue_depth);
    let task = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            let written = match command {
                Command::Send(event) => write_event(sink.as_mut(), &event).await,
                Command::SendBatch(events) => {
                    let mut result = Ok(());
                    for event in &events {
                        result = write_event(sink.as_mut(), event).await;
                        if result.is_err() {
                            break;
                        }
                    }
                    result
                }
                Command::Close => {
                    let _ = sink.close().await;
                    break;
                }
            };
            if let Err(message) = written {
                error!(%message, "outbound write failed; closing session");
                lifecycle
                    .lock()
                    .expect("lifecycle lock poisoned")
                    .force_close();
                deliverer.fail(SessionError::ConnectionLost(message)).await;
                break;
            }
        }
    });
    (SequencerHandle { tx }, task)
}

async fn write_event(sink: &mut dyn FrameSink, event: &ClientEvent) -> Result<(), String> {
    let json = encode_client_event(event).map_err(|e| e.to_string())?;
    debug!(kind = event.kind(), "sending event");
    sink.send(Bytes::from(json.into_bytes()))
        .await
        .map_err(|e| e.to_string())
}
