//! Session lifecycle state machine.
//!
//! The single authority on what may legally be sent next. Every outbound
//! operation consults it before any envelope is built, so an illegal
//! call fails synchronously and transmits nothing. Transport failure
//! forces the terminal state from anywhere.

use std::collections::HashMap;

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Connecting,
    Active,
    Closing,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentState {
    Open,
    Closed,
}

/// Tracks the session state plus the per-identifier state of every
/// outbound content stream.
#[derive(Debug)]
pub struct Lifecycle {
    session: SessionState,
    contents: HashMap<String, ContentState>,
    open_audio: Option<String>,
}

impl Lifecycle {
    /// A lifecycle begins when transport acquisition begins.
    pub fn new() -> Self {
        Self {
            session: SessionState::Connecting,
            contents: HashMap::new(),
            open_audio: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session
    }

    /// Marks the init sequence fully queued. A connection that already
    /// failed stays closed.
    pub fn activate(&mut self) {
        if self.session == SessionState::Connecting {
            self.session = SessionState::Active;
        }
    }

    /// Records the SYSTEM text content, opened and closed inside the
    /// init batch.
    pub fn register_system_content(&mut self, name: &str) {
        self.contents.insert(name.to_string(), ContentState::Closed);
    }

    pub fn begin_audio_content(&mut self, name: &str) -> Result<(), SessionError> {
        if self.session != SessionState::Active {
            return Err(SessionError::InvalidState {
                operation: "start_audio_content",
                state: self.session.to_string(),
            });
        }
        if self.open_audio.is_some() {
            return Err(SessionError::InvalidState {
                operation: "start_audio_content",
                state: "active with an audio content already open".into(),
            });
        }
        self.open_content("start_audio_content", name)?;
        self.open_audio = Some(name.to_string());
        Ok(())
    }

    pub fn end_audio_content(&mut self) {
        if let Some(name) = self.open_audio.take() {
            self.contents.insert(name, ContentState::Closed);
        }
    }

    pub fn open_audio_name(&self) -> Option<String> {
        self.open_audio.clone()
    }

    pub fn begin_tool_content(&mut self, name: &str) -> Result<(), SessionError> {
        if self.session != SessionState::Active {
            return Err(SessionError::InvalidState {
                operation: "send_tool_result",
                state: self.session.to_string(),
            });
        }
        self.open_content("send_tool_result", name)
    }

    pub fn end_content(&mut self, name: &str) {
        self.contents.insert(name.to_string(), ContentState::Closed);
    }

    /// Begins caller-initiated teardown. Returns `false` when the
    /// session is already closing or closed, in which case nothing
    /// should be sent.
    pub fn begin_close(&mut self) -> Result<bool, SessionError> {
        match self.session {
            SessionState::Active => {
                self.session = SessionState::Closing;
                Ok(true)
            }
            SessionState::Closing | SessionState::Closed => Ok(false),
            SessionState::Connecting => Err(SessionError::InvalidState {
                operation: "end_session",
                state: self.session.to_string(),
            }),
        }
    }

    pub fn finish_close(&mut self) {
        self.session = SessionState::Closed;
        self.end_audio_content();
    }

    /// Transport failure: terminal from any state.
    pub fn force_close(&mut self) {
        self.session = SessionState::Closed;
        self.open_audio = None;
    }

    /// True when end of stream should read as a clean close rather than
    /// a lost connection.
    pub fn is_closing_or_closed(&self) -> bool {
        matches!(self.session, SessionState::Closing | SessionState::Closed)
    }

    fn open_content(&mut self, operation: &'static str, name: &str) -> Result<(), SessionError> {
        if self.contents.contains_key(name) {
            return Err(SessionError::InvalidState {
                operation,
                state: format!("content identifier {name} was already used"),
            });
        }
        self.contents.insert(name.to_string(), ContentState::Open);
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
