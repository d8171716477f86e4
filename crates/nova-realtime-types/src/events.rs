//! Event envelopes and the codec between typed events and wire JSON.
//!
//! Outbound events are an externally tagged enum, so the variant name is
//! the single recognized field the protocol requires and construction
//! cannot disagree with serialization. Inbound frames are parsed by key
//! dispatch instead, which keeps event kinds this crate does not route
//! visible to the caller rather than swallowed as parse errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{
    AudioInputConfiguration, AudioOutputConfiguration, InferenceConfiguration, TextConfiguration,
    ToolConfiguration, ToolResultInputConfiguration, ToolUseOutputConfiguration,
};

/// Content stream type, as spelled on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentKind {
    Text,
    Audio,
    Tool,
}

/// Conversational role attached to content payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no `event` object")]
    MissingEvent,
    #[error("`event` object is empty")]
    EmptyEvent,
}

/// The top-level wire object wrapping one outbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEnvelope {
    pub event: ClientEvent,
}

#[derive(Serialize)]
struct ClientEnvelopeRef<'a> {
    event: &'a ClientEvent,
}

/// Events the caller sends to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientEvent {
    SessionStart(SessionStart),
    PromptStart(PromptStart),
    ContentStart(ContentStart),
    TextInput(TextInput),
    AudioInput(AudioInput),
    ToolResult(ToolResult),
    ContentEnd(ContentEnd),
    PromptEnd(PromptEnd),
    SessionEnd(SessionEnd),
}

impl ClientEvent {
    /// Wire name of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStart(_) => "sessionStart",
            Self::PromptStart(_) => "promptStart",
            Self::ContentStart(_) => "contentStart",
            Self::TextInput(_) => "textInput",
            Self::AudioInput(_) => "audioInput",
            Self::ToolResult(_) => "toolResult",
            Self::ContentEnd(_) => "contentEnd",
            Self::PromptEnd(_) => "promptEnd",
            Self::SessionEnd(_) => "sessionEnd",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStart {
    pub inference_configuration: InferenceConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptStart {
    pub prompt_name: String,
    pub text_output_configuration: TextConfiguration,
    pub audio_output_configuration: AudioOutputConfiguration,
    pub tool_use_output_configuration: ToolUseOutputConfiguration,
    pub tool_configuration: ToolConfiguration,
}

/// Opens a content stream. Exactly one of the type-specific
/// configuration blocks is present, matching `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStart {
    pub prompt_name: String,
    pub content_name: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub interactive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_input_configuration: Option<TextConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_input_configuration: Option<AudioInputConfiguration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result_input_configuration: Option<ToolResultInputConfiguration>,
}

impl ContentStart {
    pub fn text(prompt_name: impl Into<String>, content_name: impl Into<String>) -> Self {
        Self {
            prompt_name: prompt_name.into(),
            content_name: content_name.into(),
            kind: ContentKind::Text,
            interactive: true,
            text_input_configuration: Some(TextConfiguration::default()),
            audio_input_configuration: None,
            tool_result_input_configuration: None,
        }
    }

    pub fn audio(
        prompt_name: impl Into<String>,
        content_name: impl Into<String>,
        configuration: AudioInputConfiguration,
    ) -> Self {
        Self {
            prompt_name: prompt_name.into(),
            content_name: content_name.into(),
            kind: ContentKind::Audio,
            interactive: true,
            text_input_configuration: None,
            audio_input_configuration: Some(configuration),
            tool_result_input_configuration: None,
        }
    }

    pub fn tool_result(
        prompt_name: impl Into<String>,
        content_name: impl Into<String>,
        tool_use_id: impl Into<String>,
    ) -> Self {
        Self {
            prompt_name: prompt_name.into(),
            content_name: content_name.into(),
            kind: ContentKind::Tool,
            interactive: false,
            text_input_configuration: None,
            audio_input_configuration: None,
            tool_result_input_configuration: Some(ToolResultInputConfiguration::text(tool_use_id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInput {
    pub prompt_name: String,
    pub content_name: String,
    pub content: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInput {
    pub prompt_name: String,
    pub content_name: String,
    pub content: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub prompt_name: String,
    pub content_name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEnd {
    pub prompt_name: String,
    pub content_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptEnd {
    pub prompt_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEnd {}

/// Events the service streams back.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ContentStart(ServerContentStart),
    TextOutput(TextOutput),
    AudioOutput(AudioOutput),
    ToolUse(ToolUse),
    ContentEnd(ServerContentEnd),
    /// An event kind this crate does not route; carries the wire name.
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContentStart {
    pub content_id: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextOutput {
    pub content_id: String,
    pub content: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioOutput {
    pub content_id: String,
    pub content: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUse {
    pub content_id: String,
    pub tool_name: String,
    pub tool_use_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContentEnd {
    pub content_id: String,
    #[serde(rename = "type")]
    pub kind: Option<ContentKind>,
}

/// Serializes one outbound event into its wire frame.
pub fn encode_client_event(event: &ClientEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&ClientEnvelopeRef { event })?)
}

/// Parses one inbound frame, dispatching on the single event field.
pub fn decode_server_event(frame: &[u8]) -> Result<ServerEvent, CodecError> {
    let value: serde_json::Value = serde_json::from_slice(frame)?;
    let event = value
        .get("event")
        .and_then(serde_json::Value::as_object)
        .ok_or(CodecError::MissingEvent)?;
    let (name, payload) = event.iter().next().ok_or(CodecError::EmptyEvent)?;
    let event = match name.as_str() {
        "contentStart" => ServerEvent::ContentStart(serde_json::from_value(payload.clone())?),
        "textOutput" => ServerEvent::TextOutput(serde_json::from_value(payload.clone())?),
        "audioOutput" => ServerEvent::AudioOutput(serde_json::from_value(payload.clone())?),
        "toolUse" => ServerEvent::ToolUse(serde_json::from_value(payload.clone())?),
        "contentEnd" => ServerEvent::ContentEnd(serde_json::from_value(payload.clone())?),
        other => ServerEvent::Unrecognized(other.to_string()),
    };
    Ok(event)
}
