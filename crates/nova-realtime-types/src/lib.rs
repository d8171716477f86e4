//! Wire event model for the Nova bidirectional speech streaming protocol.
//!
//! Every frame on the wire is one JSON object carrying exactly one named
//! event under a top-level `event` field. This crate owns the typed
//! renditions of those events and the pure codec between them and their
//! JSON form; it holds no connection or session state.

pub mod config;
pub mod events;

pub use config::{
    AudioInputConfiguration, AudioOutputConfiguration, InferenceConfiguration, TextConfiguration,
    ToolConfiguration, ToolInputSchema, ToolResultInputConfiguration, ToolSpec, ToolSpecEntry,
    ToolUseOutputConfiguration,
};
pub use events::{
    AudioInput, AudioOutput, ClientEnvelope, ClientEvent, CodecError, ContentEnd, ContentKind,
    ContentStart,
    PromptEnd, PromptStart, Role, ServerContentEnd, ServerContentStart, ServerEvent, SessionEnd,
    SessionStart, TextInput, TextOutput, ToolResult, ToolUse, decode_server_event,
    encode_client_event,
};
