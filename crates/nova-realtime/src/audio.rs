//! Bounded, ordered pipeline between audio producers and the send path.
//!
//! Producers hand raw chunks to a bounded channel; a pump task encodes
//! each chunk and submits its `audioInput` envelope. Because the pump is
//! the only submitter of both the chunks and the closing `contentEnd`,
//! the end marker cannot overtake in-flight audio.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use bytes::Bytes;
use nova_realtime_types::events::{AudioInput, ClientEvent, ContentEnd, Role};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::error::SessionError;
use crate::outbound::SequencerHandle;

/// What `feed` does when the pipeline is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Apply backpressure to the producer. Right for interactive mic
    /// capture, where dropping audio is worse than waiting.
    #[default]
    Block,
    /// Fail fast with [`SessionError::Overflow`] for best-effort live
    /// relays that prefer losing a chunk over stalling.
    Reject,
}

pub(crate) struct AudioPipeline {
    tx: Option<mpsc::Sender<Bytes>>,
    discard: Arc<AtomicBool>,
    done: Option<oneshot::Receiver<()>>,
    policy: OverflowPolicy,
}

impl AudioPipeline {
    pub fn spawn(
        sequencer: SequencerHandle,
        prompt_name: String,
        content_name: String,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<Bytes>(capacity.max(1));
        let (done_tx, done_rx) = oneshot::channel();
        let discard = Arc::new(AtomicBool::new(false));
        let discard_flag = Arc::clone(&discard);
        tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                if discard_flag.load(Ordering::Acquire) {
                    continue;
                }
                let event = ClientEvent::AudioInput(AudioInput {
                    prompt_name: prompt_name.clone(),
                    content_name: content_name.clone(),
                    content: base64::engine::general_purpose::STANDARD.encode(&chunk),
                    role: Role::User,
                });
                if sequencer.send(event).await.is_err() {
                    warn!("send path closed while streaming audio");
                    break;
                }
            }
            if !discard_flag.load(Ordering::Acquire) {
                let end = ClientEvent::ContentEnd(ContentEnd {
                    prompt_name,
                    content_name,
                });
                if sequencer.send(end).await.is_err() {
                    warn!("send path closed before audio content end");
                }
            }
            let _ = done_tx.send(());
        });
        Self {
            tx: Some(tx),
            discard,
            done: Some(done_rx),
            policy,
        }
    }

    pub async fn feed(&self, chunk: Bytes) -> Result<(), SessionError> {
        let tx = self.tx.as_ref().ok_or(SessionError::InvalidState {
            operation: "feed_audio",
            state: "audio pipeline is draining".into(),
        })?;
        match self.policy {
            OverflowPolicy::Block => tx
                .send(chunk)
                .await
                .map_err(|_| SessionError::ConnectionLost("audio send path is closed".into())),
            OverflowPolicy::Reject => tx.try_send(chunk).map_err(|e| match e {
                TrySendError::Full(_) => SessionError::Overflow,
                TrySendError::Closed(_) => {
                    SessionError::ConnectionLost("audio send path is closed".into())
                }
            }),
        }
    }

    /// Closes the feed side and waits for every queued chunk, then the
    /// content end marker, to reach the send path.
    pub async fn finish(mut self) {
        self.tx.take();
        if let Some(done) = self.done.take() {
            let _ = done.await;
        }
    }

    /// Drains and discards queued chunks without sending anything
    /// further, then waits for the pump to exit.
    pub async fn discard(mut self) {
        self.discard.store(true, Ordering::Release);
        self.tx.take();
        if let Some(done) = self.done.take() {
            let _ = done.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Deliverer;
    use crate::lifecycle::Lifecycle;
    use crate::outbound;
    use crate::transport::memory;
    use crate::transport::{FrameSink, TransportConnector, TransportError};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration;

    async fn sequencer(queue_depth: usize) -> (SequencerHandle, memory::RemoteEnd) {
        let (connector, remote) = memory::pair(256);
        let (sink, _source) = connector.connect().await.unwrap();
        let (deliverer, _rx) = Deliverer::new(4);
        let (handle, _task) = outbound::spawn(
            sink,
            Arc::new(Mutex::new(Lifecycle::new())),
            deliverer,
            queue_depth,
        );
        (handle, remote)
    }

    #[tokio::test]
    async fn every_chunk_precedes_the_end_marker_in_order() {
        let (handle, mut remote) = sequencer(64).await;
        let pipeline = AudioPipeline::spawn(
            handle.clone(),
            "p".into(),
            "a".into(),
            8,
            OverflowPolicy::Block,
        );
        for n in 0..5u8 {
            pipeline.feed(Bytes::from(vec![n; 4])).await.unwrap();
        }
        pipeline.finish().await;
        handle.close().await;

        let mut kinds = Vec::new();
        let mut payloads = Vec::new();
        while let Some(frame) = remote.recv_frame().await {
            let value: Value = serde_json::from_slice(&frame).unwrap();
            let kind = value["event"].as_object().unwrap().keys().next().unwrap().clone();
            if kind == "audioInput" {
                payloads.push(
                    base64::engine::general_purpose::STANDARD
                        .decode(value["event"]["audioInput"]["content"].as_str().unwrap())
                        .unwrap(),
                );
            }
            kinds.push(kind);
        }
        assert_eq!(
            kinds,
            [
                "audioInput",
                "audioInput",
                "audioInput",
                "audioInput",
                "audioInput",
                "contentEnd"
            ]
        );
        for (n, payload) in payloads.iter().enumerate() {
            assert_eq!(payload, &vec![n as u8; 4]);
        }
    }

    #[tokio::test]
    async fn discard_sends_nothing_further() {
        let (handle, mut remote) = sequencer(64).await;
        let pipeline = AudioPipeline::spawn(
            handle.clone(),
            "p".into(),
            "a".into(),
            8,
            OverflowPolicy::Block,
        );
        pipeline.discard().await;
        handle.close().await;
        assert!(remote.recv_frame().await.is_none());
    }

    /// Sink whose first send never completes, pinning the writer task.
    struct StalledSink;

    #[async_trait]
    impl FrameSink for StalledSink {
        async fn send(&mut self, _frame: Bytes) -> Result<(), TransportError> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn stalled_sequencer(queue_depth: usize) -> SequencerHandle {
        let (deliverer, _rx) = Deliverer::new(4);
        let (handle, _task) = outbound::spawn(
            Box::new(StalledSink),
            Arc::new(Mutex::new(Lifecycle::new())),
            deliverer,
            queue_depth,
        );
        handle
    }

    #[tokio::test]
    async fn reject_policy_overflows_instead_of_waiting() {
        let handle = stalled_sequencer(1);
        let pipeline = AudioPipeline::spawn(
            handle,
            "p".into(),
            "a".into(),
            1,
            OverflowPolicy::Reject,
        );
        let mut overflowed = false;
        for _ in 0..8 {
            if matches!(
                pipeline.feed(Bytes::from_static(b"xxxx")).await,
                Err(SessionError::Overflow)
            ) {
                overflowed = true;
                break;
            }
        }
        assert!(overflowed, "bounded pipeline never reported overflow");
    }

    #[tokio::test]
    async fn block_policy_applies_backpressure() {
        let handle = stalled_sequencer(1);
        let pipeline = AudioPipeline::spawn(
            handle,
            "p".into(),
            "a".into(),
            1,
            OverflowPolicy::Block,
        );
        let mut blocked = false;
        for _ in 0..8 {
            if tokio::time::timeout(
                Duration::from_millis(50),
                pipeline.feed(Bytes::from_static(b"xxxx")),
            )
            .await
            .is_err()
            {
                blocked = true;
                break;
            }
        }
        assert!(blocked, "bounded pipeline never blocked the producer");
    }
}
