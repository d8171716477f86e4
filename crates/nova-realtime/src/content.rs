//! Assembly of streamed fragments and delivery of finished items to the
//! caller.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use nova_realtime_types::events::{ContentKind, Role};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::SessionError;

/// How text output reaches the caller.
///
/// Audio always accumulates until its terminal event, because playback
/// scheduling needs the assembled clip's duration estimate up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextDelivery {
    /// Hand over the full transcript when the content ends.
    #[default]
    Assembled,
    /// Hand over each delta as its own item for live captioning.
    Incremental,
}

/// Payload of one delivered item; the variant is the content kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemPayload {
    Text(String),
    Audio { data: Vec<u8>, duration_secs: f64 },
}

/// One unit of output handed to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionItem {
    pub content_id: String,
    pub role: Role,
    pub payload: ItemPayload,
    pub timestamp_millis: u64,
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Mutable buffer assembling one inbound content stream.
///
/// Audio deltas are base64 text and are concatenated *as text*; a
/// fragment boundary may split a base64 group, so decoding happens only
/// once the content is complete.
#[derive(Debug)]
pub(crate) struct ContentAccumulator {
    pub kind: ContentKind,
    role: Option<Role>,
    buffer: String,
}

impl ContentAccumulator {
    pub fn new(kind: ContentKind, role: Option<Role>) -> Self {
        Self {
            kind,
            role,
            buffer: String::new(),
        }
    }

    pub fn append(&mut self, fragment: &str, role: Role) {
        self.role = Some(role);
        self.buffer.push_str(fragment);
    }

    pub fn into_parts(self) -> (String, Role) {
        (self.buffer, self.role.unwrap_or(Role::Assistant))
    }
}

/// Shared handle on the item channel's send side.
///
/// The dispatcher, the writer task and teardown all hold one; whichever
/// observes a terminal condition first emits the single closing signal
/// (an `Err` item for failures, a bare channel close for clean ends).
#[derive(Clone)]
pub(crate) struct Deliverer {
    tx: Arc<Mutex<Option<mpsc::Sender<Result<SessionItem, SessionError>>>>>,
}

impl Deliverer {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Result<SessionItem, SessionError>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    pub async fn deliver(&self, item: SessionItem) {
        let tx = self
            .tx
            .lock()
            .expect("item channel lock poisoned")
            .clone();
        if let Some(tx) = tx
            && tx.send(Ok(item)).await.is_err()
        {
            debug!("item receiver dropped; discarding delivery");
        }
    }

    /// Emits the terminal error and closes the channel. Later calls are
    /// no-ops, so a session fails at most once.
    pub async fn fail(&self, error: SessionError) {
        let tx = self.tx.lock().expect("item channel lock poisoned").take();
        if let Some(tx) = tx {
            let _ = tx.send(Err(error)).await;
        }
    }

    /// Closes the channel without an error: the clean terminal signal.
    pub fn finish(&self) {
        self.tx.lock().expect("item channel lock poisoned").take();
    }
}
