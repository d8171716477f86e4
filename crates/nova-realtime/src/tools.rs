//! Tool invocation round trip.
//!
//! The model asks for a tool by name; a bridge task resolves it against
//! a registry of external providers and injects the outcome back into
//! the conversation as a fresh TOOL content stream. Invocations are
//! strictly serialized: the wire protocol does not document concurrent
//! outstanding tool uses, so a second request queues behind the first.
//! Whatever happens - unknown tool, unparseable arguments, provider
//! failure - a terminating result referencing the same tool-use id goes
//! out, because the model is blocked until that content closes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nova_realtime_types::events::{ClientEvent, ContentEnd, ContentStart, ToolResult};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::lifecycle::Lifecycle;
use crate::outbound::SequencerHandle;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("no provider registered for tool {0}")]
    UnknownTool(String),
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),
    #[error("tool provider failed: {0}")]
    Provider(String),
}

/// One external capability the model may invoke. Providers may shell out
/// to subprocesses or call other services; the bridge only sees JSON in,
/// JSON out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn invoke(&self, args: Value) -> Result<Value, ToolError>;
}

/// Tool providers keyed by the name the model uses.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    providers: HashMap<String, Arc<dyn ToolProvider>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn ToolProvider>) {
        self.providers.insert(name.into(), provider);
    }

    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        provider.invoke(args).await
    }
}

/// A `toolUse` observed by the dispatcher, queued for the bridge.
#[derive(Debug)]
pub(crate) struct ToolInvocation {
    pub tool_name: String,
    pub tool_use_id: String,
    /// JSON-encoded argument payload, still unparsed.
    pub content: String,
}

pub(crate) fn spawn_bridge(
    registry: ToolRegistry,
    sequencer: SequencerHandle,
    lifecycle: Arc<Mutex<Lifecycle>>,
    prompt_name: String,
) -> (mpsc::UnboundedSender<ToolInvocation>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ToolInvocation>();
    let task = tokio::spawn(async move {
        while let Some(invocation) = rx.recv().await {
            debug!(tool = %invocation.tool_name, tool_use_id = %invocation.tool_use_id, "invoking tool");
            let payload = resolve(&registry, &invocation).await;
            let content_name = Uuid::new_v4().to_string();
            let admitted = lifecycle
                .lock()
                .expect("lifecycle lock poisoned")
                .begin_tool_content(&content_name)
                .is_ok();
            if !admitted {
                warn!(tool = %invocation.tool_name, "session is closing; dropping tool result");
                continue;
            }
            let batch = vec![
                ClientEvent::ContentStart(ContentStart::tool_result(
                    prompt_name.clone(),
                    content_name.clone(),
                    invocation.tool_use_id.clone(),
                )),
                ClientEvent::ToolResult(ToolResult {
                    prompt_name: prompt_name.clone(),
                    content_name: content_name.clone(),
                    content: payload,
                }),
                ClientEvent::ContentEnd(ContentEnd {
                    prompt_name: prompt_name.clone(),
                    content_name: content_name.clone(),
                }),
            ];
            if sequencer.send_batch(batch).await.is_err() {
                warn!(tool = %invocation.tool_name, "send path closed before the tool result went out");
                break;
            }
            lifecycle
                .lock()
                .expect("lifecycle lock poisoned")
                .end_content(&content_name);
        }
    });
    (tx, task)
}

/// Produces the result payload: `{"result": ...}` on success, an
/// explicit `{"error": ...}` otherwise - never nothing.
async fn resolve(registry: &ToolRegistry, invocation: &ToolInvocation) -> String {
    let parsed = if invocation.content.trim().is_empty() {
        Ok(Value::Object(serde_json::Map::new()))
    } else {
        serde_json::from_str::<Value>(&invocation.content)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))
    };
    let outcome = match parsed {
        Ok(args) => registry.invoke(&invocation.tool_name, args).await,
        Err(err) => Err(err),
    };
    match outcome {
        Ok(value) => serde_json::json!({ "result": value }).to_string(),
        Err(err) => {
            warn!(tool = %invocation.tool_name, error = %err, "synthesizing error result");
            serde_json::json!({ "error": err.to_string() }).to_string()
        }
    }
}
