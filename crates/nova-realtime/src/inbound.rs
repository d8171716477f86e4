//! Receive-side demultiplexer.
//!
//! A single task owns the transport source, decodes each frame and
//! routes it by event kind and content identity. Undecodable frames are
//! dropped, a service validation error is terminal, and an end of stream
//! the caller did not ask for reads as a lost connection. Tool requests
//! are queued to the bridge without waiting, so unrelated content
//! streams keep flowing while a tool runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use base64::Engine;
use nova_realtime_types::events::{
    ContentKind, Role, ServerContentEnd, ServerContentStart, ServerEvent, decode_server_event,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::content::{ContentAccumulator, Deliverer, ItemPayload, SessionItem, TextDelivery, now_millis};
use crate::convert::AudioConverter;
use crate::error::SessionError;
use crate::lifecycle::Lifecycle;
use crate::tools::ToolInvocation;
use crate::transport::{FrameSource, TransportError};

pub(crate) struct InboundDispatcher {
    source: Box<dyn FrameSource>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    deliverer: Deliverer,
    converter: Arc<dyn AudioConverter>,
    bridge: mpsc::UnboundedSender<ToolInvocation>,
    text_delivery: TextDelivery,
    accumulators: HashMap<String, ContentAccumulator>,
}

impl InboundDispatcher {
    pub fn spawn(
        source: Box<dyn FrameSource>,
        lifecycle: Arc<Mutex<Lifecycle>>,
        deliverer: Deliverer,
        converter: Arc<dyn AudioConverter>,
        bridge: mpsc::UnboundedSender<ToolInvocation>,
        text_delivery: TextDelivery,
    ) -> JoinHandle<()> {
        let dispatcher = Self {
            source,
            lifecycle,
            deliverer,
            converter,
            bridge,
            text_delivery,
            accumulators: HashMap::new(),
        };
        tokio::spawn(dispatcher.run())
    }

    async fn run(mut self) {
        loop {
            match self.source.next_frame().await {
                Ok(Some(frame)) => match decode_server_event(&frame) {
                    Ok(event) => self.route(event).await,
                    Err(err) => warn!(error = %err, "dropping undecodable frame"),
                },
                Ok(None) => {
                    let caller_closed = self
                        .lifecycle
                        .lock()
                        .expect("lifecycle lock poisoned")
                        .is_closing_or_closed();
                    if caller_closed {
                        info!("receive stream ended after close");
                        self.deliverer.finish();
                    } else {
                        error!("receive stream ended unexpectedly");
                        self.close_with(SessionError::ConnectionLost(
                            "unexpected end of stream".into(),
                        ))
                        .await;
                    }
                    break;
                }
                Err(TransportError::Validation(message)) => {
                    error!(%message, "service rejected the stream");
                    self.close_with(SessionError::ProtocolValidationFailed(message))
                        .await;
                    break;
                }
                Err(err) => {
                    error!(error = %err, "receive loop failed");
                    self.close_with(SessionError::ConnectionLost(err.to_string()))
                        .await;
                    break;
                }
            }
        }
    }

    async fn close_with(&mut self, error: SessionError) {
        self.lifecycle
            .lock()
            .expect("lifecycle lock poisoned")
            .force_close();
        self.deliverer.fail(error).await;
    }

    async fn route(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::ContentStart(start) => self.on_content_start(start),
            ServerEvent::TextOutput(output) => {
                match self.text_delivery {
                    TextDelivery::Incremental => {
                        self.deliverer
                            .deliver(SessionItem {
                                content_id: output.content_id,
                                role: output.role,
                                payload: ItemPayload::Text(output.content),
                                timestamp_millis: now_millis(),
                            })
                            .await;
                    }
                    TextDelivery::Assembled => {
                        self.append(&output.content_id, &output.content, output.role);
                    }
                }
            }
            ServerEvent::AudioOutput(output) => {
                self.append(&output.content_id, &output.content, output.role);
            }
            ServerEvent::ContentEnd(end) => self.on_content_end(end).await,
            ServerEvent::ToolUse(tool_use) => {
                debug!(
                    tool = %tool_use.tool_name,
                    content_id = %tool_use.content_id,
                    "tool invocation requested"
                );
                let invocation = ToolInvocation {
                    tool_name: tool_use.tool_name,
                    tool_use_id: tool_use.tool_use_id,
                    content: tool_use.content,
                };
                if self.bridge.send(invocation).is_err() {
                    warn!("tool bridge is gone; dropping invocation");
                }
            }
            ServerEvent::Unrecognized(kind) => debug!(%kind, "ignoring unrecognized event"),
        }
    }

    fn on_content_start(&mut self, start: ServerContentStart) {
        if self.accumulators.contains_key(&start.content_id) {
            warn!(content_id = %start.content_id, "duplicate contentStart; replacing accumulator");
        }
        self.accumulators.insert(
            start.content_id,
            ContentAccumulator::new(start.kind, start.role),
        );
    }

    fn append(&mut self, content_id: &str, fragment: &str, role: Role) {
        match self.accumulators.get_mut(content_id) {
            Some(accumulator) => accumulator.append(fragment, role),
            None => warn!(%content_id, "delta for unknown content; dropping"),
        }
    }

    async fn on_content_end(&mut self, end: ServerContentEnd) {
        let Some(accumulator) = self.accumulators.remove(&end.content_id) else {
            debug!(content_id = %end.content_id, "contentEnd for unknown content");
            return;
        };
        match accumulator.kind {
            ContentKind::Text => {
                if self.text_delivery == TextDelivery::Assembled {
                    let (transcript, role) = accumulator.into_parts();
                    self.deliverer
                        .deliver(SessionItem {
                            content_id: end.content_id,
                            role,
                            payload: ItemPayload::Text(transcript),
                            timestamp_millis: now_millis(),
                        })
                        .await;
                }
            }
            ContentKind::Audio => {
                let (encoded, role) = accumulator.into_parts();
                let raw = match base64::engine::general_purpose::STANDARD.decode(encoded.as_bytes())
                {
                    Ok(raw) => raw,
                    Err(err) => {
                        warn!(content_id = %end.content_id, error = %err, "discarding audio content with invalid base64");
                        return;
                    }
                };
                match self.converter.from_wire_format(&raw) {
                    Ok(clip) => {
                        self.deliverer
                            .deliver(SessionItem {
                                content_id: end.content_id,
                                role,
                                payload: ItemPayload::Audio {
                                    data: clip.data,
                                    duration_secs: clip.duration_secs,
                                },
                                timestamp_millis: now_millis(),
                            })
                            .await;
                    }
                    Err(err) => {
                        warn!(content_id = %end.content_id, error = %err, "audio conversion failed; discarding clip");
                    }
                }
            }
            // Tool completion is driven by `toolUse`, not `contentEnd`.
            ContentKind::Tool => {}
        }
    }
}
