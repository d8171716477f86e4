//! Bidirectional streaming session manager for a real-time speech
//! conversational service.
//!
//! One duplex byte-stream connection becomes a structured conversation:
//! session, prompt and content lifecycles with strict start/end framing
//! on the outbound side, concurrent demultiplexing of inbound events by
//! content identity, a bounded audio pipeline with backpressure, and a
//! serialized tool round trip that never leaves the model waiting.
//!
//! ```no_run
//! use std::sync::Arc;
//! use nova_realtime::{
//!     LpcmPassthrough, Session, SessionConfig, ToolRegistry,
//!     transport::websocket::WebSocketConnector,
//! };
//!
//! # async fn run() -> Result<(), nova_realtime::SessionError> {
//! let connector = WebSocketConnector::new("wss://example.com/stream");
//! let (session, mut items) = Session::start(
//!     &connector,
//!     SessionConfig::default(),
//!     ToolRegistry::new(),
//!     Arc::new(LpcmPassthrough::default()),
//! )
//! .await?;
//!
//! session.start_audio_content().await?;
//! session.feed_audio(&[0u8; 3200]).await?;
//! session.end_audio_content().await?;
//!
//! while let Some(item) = items.recv().await {
//!     println!("{:?}", item?);
//! }
//! session.end_session().await?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod content;
pub mod convert;
pub mod error;
pub mod lifecycle;
pub mod session;
pub mod tools;
pub mod transport;

mod inbound;
mod outbound;

pub use nova_realtime_types as types;

pub use audio::OverflowPolicy;
pub use content::{ItemPayload, SessionItem, TextDelivery};
pub use convert::{AudioConverter, ConvertError, LpcmPassthrough, PlayableAudio};
pub use error::SessionError;
pub use lifecycle::SessionState;
pub use session::{DEFAULT_SYSTEM_PROMPT, Session, SessionConfig};
pub use tools::{ToolError, ToolProvider, ToolRegistry};
pub use transport::{FrameSink, FrameSource, TransportConnector, TransportError};
