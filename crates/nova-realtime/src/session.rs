//! The owned session handle.
//!
//! `Session::start` acquires the transport, wires the writer, reader and
//! tool-bridge tasks together, and queues the init sequence before
//! reporting the session active. Every session is an explicitly
//! constructed value: nothing here is process-global, and dropping the
//! handle tears the tasks down through their channels.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use nova_realtime_types::config::{
    AudioInputConfiguration, AudioOutputConfiguration, InferenceConfiguration, TextConfiguration,
    ToolConfiguration, ToolSpec, ToolSpecEntry, ToolUseOutputConfiguration,
};
use nova_realtime_types::events::{
    ClientEvent, ContentEnd, ContentStart, PromptEnd, PromptStart, Role, SessionEnd, SessionStart,
    TextInput,
};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::audio::{AudioPipeline, OverflowPolicy};
use crate::content::{Deliverer, SessionItem, TextDelivery};
use crate::convert::AudioConverter;
use crate::error::SessionError;
use crate::inbound::InboundDispatcher;
use crate::lifecycle::{Lifecycle, SessionState};
use crate::outbound::{self, SequencerHandle};
use crate::tools::{self, ToolRegistry};
use crate::transport::TransportConnector;

/// System prompt queued with the init sequence unless overridden.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly assistant. The user and you will \
     engage in a spoken dialog exchanging the transcripts of a natural real-time conversation. \
     Keep your responses short, generally two or three sentences for chatty scenarios.";

/// Everything a session announces at start plus the local tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub inference: InferenceConfiguration,
    pub system_prompt: String,
    pub text_output: TextConfiguration,
    pub audio_output: AudioOutputConfiguration,
    pub audio_input: AudioInputConfiguration,
    /// Tools offered to the model in `promptStart`.
    pub tools: Vec<ToolSpec>,
    /// Raw bytes per `audioInput` envelope; a latency/overhead tradeoff.
    pub chunk_size: usize,
    /// Audio pipeline capacity, in chunks.
    pub pipeline_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub text_delivery: TextDelivery,
    /// Buffered items on the delivery channel before the reader blocks.
    pub item_buffer: usize,
    /// Queued envelopes on the send path before producers block.
    pub outbound_queue_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inference: InferenceConfiguration::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            text_output: TextConfiguration::default(),
            audio_output: AudioOutputConfiguration::default(),
            audio_input: AudioInputConfiguration::default(),
            tools: Vec::new(),
            chunk_size: 1024,
            pipeline_capacity: 32,
            overflow_policy: OverflowPolicy::default(),
            text_delivery: TextDelivery::default(),
            item_buffer: 64,
            outbound_queue_depth: 64,
        }
    }
}

/// One live conversation over one transport connection.
pub struct Session {
    lifecycle: Arc<Mutex<Lifecycle>>,
    sequencer: SequencerHandle,
    audio: tokio::sync::Mutex<Option<AudioPipeline>>,
    prompt_name: String,
    config: SessionConfig,
    deliverer: Deliverer,
    reader: tokio::task::JoinHandle<()>,
}

impl Session {
    /// Connects and queues the ordered init sequence: session start,
    /// prompt start, and the SYSTEM text content. Returns the session
    /// handle plus the item channel carrying everything the service
    /// streams back; the channel closing is the terminal signal, with a
    /// final `Err` item when the end was not clean.
    pub async fn start(
        connector: &dyn TransportConnector,
        config: SessionConfig,
        tools: ToolRegistry,
        converter: Arc<dyn AudioConverter>,
    ) -> Result<
        (
            Self,
            mpsc::Receiver<Result<SessionItem, SessionError>>,
        ),
        SessionError,
    > {
        let (sink, source) = connector
            .connect()
            .await
            .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;
        info!("transport connected");

        let lifecycle = Arc::new(Mutex::new(Lifecycle::new()));
        let prompt_name = Uuid::new_v4().to_string();
        let (deliverer, items) = Deliverer::new(config.item_buffer);
        let (sequencer, _writer) = outbound::spawn(
            sink,
            Arc::clone(&lifecycle),
            deliverer.clone(),
            config.outbound_queue_depth,
        );
        let (bridge_tx, _bridge) = tools::spawn_bridge(
            tools,
            sequencer.clone(),
            Arc::clone(&lifecycle),
            prompt_name.clone(),
        );
        let reader = InboundDispatcher::spawn(
            source,
            Arc::clone(&lifecycle),
            deliverer.clone(),
            converter,
            bridge_tx,
            config.text_delivery,
        );

        let text_content_name = Uuid::new_v4().to_string();
        let init = vec![
            ClientEvent::SessionStart(SessionStart {
                inference_configuration: config.inference.clone(),
            }),
            ClientEvent::PromptStart(PromptStart {
                prompt_name: prompt_name.clone(),
                text_output_configuration: config.text_output.clone(),
                audio_output_configuration: config.audio_output.clone(),
                tool_use_output_configuration: ToolUseOutputConfiguration::default(),
                tool_configuration: ToolConfiguration {
                    tools: config
                        .tools
                        .iter()
                        .cloned()
                        .map(|tool_spec| ToolSpecEntry { tool_spec })
                        .collect(),
                },
            }),
            ClientEvent::ContentStart(ContentStart::text(
                prompt_name.clone(),
                text_content_name.clone(),
            )),
            ClientEvent::TextInput(TextInput {
                prompt_name: prompt_name.clone(),
                content_name: text_content_name.clone(),
                content: config.system_prompt.clone(),
                role: Role::System,
            }),
            ClientEvent::ContentEnd(ContentEnd {
                prompt_name: prompt_name.clone(),
                content_name: text_content_name.clone(),
            }),
        ];
        lifecycle
            .lock()
            .expect("lifecycle lock poisoned")
            .register_system_content(&text_content_name);
        sequencer.send_batch(init).await?;
        lifecycle
            .lock()
            .expect("lifecycle lock poisoned")
            .activate();
        info!(%prompt_name, "session active");

        let session = Self {
            lifecycle,
            sequencer,
            audio: tokio::sync::Mutex::new(None),
            prompt_name,
            config,
            deliverer,
            reader,
        };
        Ok((session, items))
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle
            .lock()
            .expect("lifecycle lock poisoned")
            .state()
    }

    /// Opens the audio content stream for this prompt. At most one may
    /// be open at a time.
    pub async fn start_audio_content(&self) -> Result<(), SessionError> {
        let mut audio = self.audio.lock().await;
        let content_name = Uuid::new_v4().to_string();
        self.lifecycle
            .lock()
            .expect("lifecycle lock poisoned")
            .begin_audio_content(&content_name)?;
        let start = ClientEvent::ContentStart(ContentStart::audio(
            self.prompt_name.clone(),
            content_name.clone(),
            self.config.audio_input.clone(),
        ));
        self.sequencer.send(start).await?;
        *audio = Some(AudioPipeline::spawn(
            self.sequencer.clone(),
            self.prompt_name.clone(),
            content_name,
            self.config.pipeline_capacity,
            self.config.overflow_policy,
        ));
        Ok(())
    }

    /// Queues raw PCM for transmission, sliced into envelopes of the
    /// configured chunk size. Blocks or fails on a full pipeline per the
    /// overflow policy.
    pub async fn feed_audio(&self, buffer: &[u8]) -> Result<(), SessionError> {
        let audio = self.audio.lock().await;
        let pipeline = audio.as_ref().ok_or(SessionError::InvalidState {
            operation: "feed_audio",
            state: "no audio content is open".into(),
        })?;
        for chunk in buffer.chunks(self.config.chunk_size.max(1)) {
            pipeline.feed(Bytes::copy_from_slice(chunk)).await?;
        }
        Ok(())
    }

    /// Drains the pipeline, then closes the audio content. Every chunk
    /// queued before this call is transmitted ahead of the end marker.
    pub async fn end_audio_content(&self) -> Result<(), SessionError> {
        let mut audio = self.audio.lock().await;
        let pipeline = audio.take().ok_or(SessionError::InvalidState {
            operation: "end_audio_content",
            state: "no audio content is open".into(),
        })?;
        pipeline.finish().await;
        self.lifecycle
            .lock()
            .expect("lifecycle lock poisoned")
            .end_audio_content();
        Ok(())
    }

    /// Ends the conversation: closes any open audio content (discarding
    /// queued chunks), then emits prompt end and session end and
    /// releases the transport. Calling it again on a closed session is a
    /// no-op.
    pub async fn end_session(&self) -> Result<(), SessionError> {
        let (proceed, open_audio) = {
            let mut lifecycle = self.lifecycle.lock().expect("lifecycle lock poisoned");
            (lifecycle.begin_close()?, lifecycle.open_audio_name())
        };
        if !proceed {
            return Ok(());
        }
        if let Some(pipeline) = self.audio.lock().await.take() {
            pipeline.discard().await;
        }
        let mut batch = Vec::new();
        if let Some(content_name) = open_audio {
            batch.push(ClientEvent::ContentEnd(ContentEnd {
                prompt_name: self.prompt_name.clone(),
                content_name,
            }));
        }
        batch.push(ClientEvent::PromptEnd(PromptEnd {
            prompt_name: self.prompt_name.clone(),
        }));
        batch.push(ClientEvent::SessionEnd(SessionEnd {}));

        let sent = self.sequencer.send_batch(batch).await;
        self.sequencer.close().await;
        self.lifecycle
            .lock()
            .expect("lifecycle lock poisoned")
            .finish_close();
        // The caller asked for the close; it gets its terminal signal
        // now rather than whenever the remote decides to hang up.
        self.reader.abort();
        self.deliverer.finish();
        info!("session closed");
        sent
    }
}
