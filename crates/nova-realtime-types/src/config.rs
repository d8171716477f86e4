//! Configuration blocks embedded in `sessionStart`, `promptStart` and
//! `contentStart` events.
//!
//! Field names and defaults follow the service's wire contract: linear
//! PCM in at 16 kHz, out at 24 kHz, 16-bit mono, base64-encoded speech.

use serde::{Deserialize, Serialize};

use crate::events::ContentKind;

/// Inference parameters announced at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfiguration {
    pub max_tokens: u32,
    pub top_p: f32,
    pub temperature: f32,
}

impl Default for InferenceConfiguration {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            top_p: 0.95,
            temperature: 0.7,
        }
    }
}

/// Media type declaration for text content, both input and output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextConfiguration {
    pub media_type: String,
}

impl Default for TextConfiguration {
    fn default() -> Self {
        Self {
            media_type: "text/plain".into(),
        }
    }
}

/// Format of the audio the caller will stream in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInputConfiguration {
    pub media_type: String,
    pub sample_rate_hertz: u32,
    pub sample_size_bits: u32,
    pub channel_count: u32,
    pub audio_type: String,
    pub encoding: String,
}

impl Default for AudioInputConfiguration {
    fn default() -> Self {
        Self {
            media_type: "audio/lpcm".into(),
            sample_rate_hertz: 16_000,
            sample_size_bits: 16,
            channel_count: 1,
            audio_type: "SPEECH".into(),
            encoding: "base64".into(),
        }
    }
}

/// Format and voice of the audio the service will stream back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioOutputConfiguration {
    pub media_type: String,
    pub sample_rate_hertz: u32,
    pub sample_size_bits: u32,
    pub channel_count: u32,
    pub voice_id: String,
    pub encoding: String,
    pub audio_type: String,
}

impl Default for AudioOutputConfiguration {
    fn default() -> Self {
        Self {
            media_type: "audio/lpcm".into(),
            sample_rate_hertz: 24_000,
            sample_size_bits: 16,
            channel_count: 1,
            voice_id: "en_us_matthew".into(),
            encoding: "base64".into(),
            audio_type: "SPEECH".into(),
        }
    }
}

/// Media type the service uses when it emits `toolUse` payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseOutputConfiguration {
    pub media_type: String,
}

impl Default for ToolUseOutputConfiguration {
    fn default() -> Self {
        Self {
            media_type: "application/json".into(),
        }
    }
}

/// Set of tools offered to the model for the prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfiguration {
    pub tools: Vec<ToolSpecEntry>,
}

/// Wire nesting around a single tool specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpecEntry {
    pub tool_spec: ToolSpec,
}

/// One tool the model may invoke: a name, a description, and a JSON
/// schema for its arguments carried as schema text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInputSchema {
    pub json: String,
}

/// Declares which `toolUse` a TOOL content stream answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultInputConfiguration {
    pub tool_use_id: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub text_input_configuration: TextConfiguration,
}

impl ToolResultInputConfiguration {
    pub fn text(tool_use_id: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            kind: ContentKind::Text,
            text_input_configuration: TextConfiguration::default(),
        }
    }
}
