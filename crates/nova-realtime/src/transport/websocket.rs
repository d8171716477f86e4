//! WebSocket adapter for the frame transport.
//!
//! Suits deployments where a socket gateway bridges the speech protocol,
//! with the JSON envelopes carried as text messages. A close frame with
//! a policy code is surfaced as a validation failure so the session
//! distinguishes "the service rejected us" from plain disconnection.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        client::IntoClientRequest,
        protocol::{Message as WsMessage, frame::coding::CloseCode},
    },
};
use tracing::info;

use super::{FrameSink, FrameSource, TransportConnector, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to a websocket endpoint, optionally with bearer-token auth.
pub struct WebSocketConnector {
    url: String,
    bearer_token: Option<SecretString>,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bearer_token: None,
        }
    }

    pub fn with_bearer_token(mut self, token: SecretString) -> Self {
        self.bearer_token = Some(token);
        self
    }
}

#[async_trait]
impl TransportConnector for WebSocketConnector {
    async fn connect(
        &self,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        if let Some(token) = &self.bearer_token {
            let header = format!("Bearer {}", token.expose_secret())
                .parse()
                .map_err(|_| TransportError::Connect("bearer token is not a valid header".into()))?;
            request.headers_mut().insert("Authorization", header);
        }
        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!(url = %self.url, "websocket transport connected");
        let (tx, rx) = stream.split();
        Ok((Box::new(WsSink { tx }), Box::new(WsSource { rx })))
    }
}

struct WsSink {
    tx: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let text = String::from_utf8(frame.to_vec())
            .map_err(|e| TransportError::Io(format!("frame is not utf-8: {e}")))?;
        self.tx
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx
            .close()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

struct WsSource {
    rx: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Result<Option<Bytes>, TransportError> {
        while let Some(message) = self.rx.next().await {
            match message {
                Ok(WsMessage::Text(text)) => return Ok(Some(Bytes::from(text.into_bytes()))),
                Ok(WsMessage::Binary(data)) => return Ok(Some(Bytes::from(data))),
                Ok(WsMessage::Close(frame)) => {
                    if let Some(frame) = frame
                        && matches!(frame.code, CloseCode::Policy | CloseCode::Invalid)
                    {
                        return Err(TransportError::Validation(frame.reason.to_string()));
                    }
                    return Ok(None);
                }
                Ok(_) => {}
                Err(e) => return Err(TransportError::Io(e.to_string())),
            }
        }
        Ok(None)
    }
}
