//! File-driven console for the realtime speech session.
//!
//! Streams a raw LPCM capture (16 kHz, 16-bit, mono) through a session,
//! prints the transcripts the service sends back, and writes returned
//! audio as WAV clips. A current-date tool is registered so tool round
//! trips can be exercised end to end.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use nova_realtime::{
    AudioConverter, ConvertError, ItemPayload, PlayableAudio, Session, SessionConfig, ToolError,
    ToolProvider, ToolRegistry, transport::websocket::WebSocketConnector,
};
use nova_realtime_types::config::{ToolInputSchema, ToolSpec};
use secrecy::SecretString;
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const WIRE_INPUT_RATE: u32 = 16_000;
const WIRE_OUTPUT_RATE: u32 = 24_000;

#[derive(Parser, Debug)]
#[command(name = "nova-console", about = "Stream a PCM capture through a realtime speech session")]
struct Args {
    /// WebSocket endpoint bridging the speech service. Falls back to
    /// the NOVA_ENDPOINT environment variable.
    #[arg(long)]
    endpoint: Option<String>,

    /// Raw LPCM input file: 16 kHz, 16-bit little-endian, mono.
    #[arg(long)]
    input: PathBuf,

    /// Directory for returned audio clips.
    #[arg(long, default_value = "clips")]
    out_dir: PathBuf,

    /// Raw bytes per audioInput envelope.
    #[arg(long, default_value_t = 1024)]
    chunk_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let pcm = std::fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let endpoint = args
        .endpoint
        .clone()
        .or_else(|| std::env::var("NOVA_ENDPOINT").ok())
        .context("--endpoint or NOVA_ENDPOINT is required")?;
    let mut connector = WebSocketConnector::new(endpoint);
    if let Ok(token) = std::env::var("NOVA_BEARER_TOKEN") {
        connector = connector.with_bearer_token(SecretString::from(token));
    }

    let mut registry = ToolRegistry::new();
    registry.register("getDateTool", Arc::new(DateTool));

    let config = SessionConfig {
        tools: vec![date_tool_spec()],
        chunk_size: args.chunk_size,
        ..SessionConfig::default()
    };
    let converter = Arc::new(WavConverter);

    let (session, mut items) = Session::start(&connector, config, registry, converter.clone())
        .await
        .context("starting session")?;

    let out_dir = args.out_dir.clone();
    let mut printer = tokio::spawn(async move {
        let mut clip_index = 0usize;
        while let Some(item) = items.recv().await {
            match item {
                Ok(item) => match item.payload {
                    ItemPayload::Text(text) => info!(role = ?item.role, "{text}"),
                    ItemPayload::Audio {
                        data,
                        duration_secs,
                    } => {
                        clip_index += 1;
                        let path = out_dir.join(format!("clip-{clip_index:03}.wav"));
                        match std::fs::write(&path, &data) {
                            Ok(()) => {
                                info!(path = %path.display(), duration_secs, "saved audio clip");
                            }
                            Err(err) => warn!(error = %err, "failed to save audio clip"),
                        }
                    }
                },
                Err(err) => {
                    error!(error = %err, "session terminated");
                    return;
                }
            }
        }
        info!("session closed cleanly");
    });

    let wire_audio = converter.to_wire_format(&pcm, WIRE_INPUT_RATE, 1)?;
    info!(bytes = wire_audio.len(), "streaming capture");
    session.start_audio_content().await?;
    session.feed_audio(&wire_audio).await?;
    session.end_audio_content().await?;

    info!("capture sent; press ctrl-c to end the session");
    let finished_early = tokio::select! {
        _ = tokio::signal::ctrl_c() => false,
        joined = &mut printer => {
            joined?;
            true
        }
    };
    session.end_session().await?;
    if !finished_early {
        printer.await?;
    }
    Ok(())
}

fn date_tool_spec() -> ToolSpec {
    ToolSpec {
        name: "getDateTool".into(),
        description: "get information about the current date".into(),
        input_schema: ToolInputSchema {
            json: serde_json::json!({
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "object",
                "properties": {},
                "required": []
            })
            .to_string(),
        },
    }
}

struct DateTool;

#[async_trait]
impl ToolProvider for DateTool {
    async fn invoke(&self, _args: Value) -> Result<Value, ToolError> {
        Ok(Value::String(Utc::now().format("%A, %Y-%m-%d").to_string()))
    }
}

/// Wraps wire-format output in a WAV container for playback; capture is
/// expected to already match the wire input format.
struct WavConverter;

impl AudioConverter for WavConverter {
    fn to_wire_format(
        &self,
        raw: &[u8],
        source_rate: u32,
        channels: u16,
    ) -> Result<Vec<u8>, ConvertError> {
        if channels != 1 || source_rate != WIRE_INPUT_RATE {
            return Err(ConvertError::Unsupported(format!(
                "expected {WIRE_INPUT_RATE} Hz mono capture, got {source_rate} Hz {channels}-channel"
            )));
        }
        Ok(raw.to_vec())
    }

    fn from_wire_format(&self, raw: &[u8]) -> Result<PlayableAudio, ConvertError> {
        Ok(PlayableAudio {
            data: wav_from_lpcm(raw, WIRE_OUTPUT_RATE),
            duration_secs: raw.len() as f64 / (WIRE_OUTPUT_RATE as f64 * 2.0),
        })
    }
}

/// Prepends a 44-byte WAV header to 16-bit mono LPCM.
fn wav_from_lpcm(data: &[u8], sample_rate: u32) -> Vec<u8> {
    let byte_rate = sample_rate * 2;
    let mut wav = Vec::with_capacity(44 + data.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data.len() as u32).to_le_bytes());
    wav.extend_from_slice(data);
    wav
}
