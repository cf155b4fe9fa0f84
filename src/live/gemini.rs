//! Gemini Live websocket transport

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::protocol::{RealtimeInputMessage, ServerMessage, SetupMessage};
use super::{LiveConnector, LiveEvent, LiveSession, LiveSetup, Outbound};
use crate::{Config, Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to the Gemini Live bidirectional streaming endpoint
#[derive(Clone)]
pub struct GeminiLiveConnector {
    api_key: Option<SecretString>,
    endpoint: String,
    connect_timeout: Duration,
    close_timeout: Duration,
}

impl GeminiLiveConnector {
    /// Create a connector for an explicit endpoint
    #[must_use]
    pub const fn new(
        api_key: Option<SecretString>,
        endpoint: String,
        connect_timeout: Duration,
        close_timeout: Duration,
    ) -> Self {
        Self {
            api_key,
            endpoint,
            connect_timeout,
            close_timeout,
        }
    }

    /// Create a connector from loaded configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.api_key.clone(),
            config.live.endpoint.clone(),
            config.live.connect_timeout,
            config.live.close_timeout,
        )
    }

    fn url(&self) -> Result<url::Url> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Connection("API key missing".to_string()))?;

        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid live endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("key", api_key.expose_secret());
        Ok(url)
    }
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveSession> {
        let url = self.url()?;

        let (ws, _) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| Error::Connection("timed out connecting to live endpoint".to_string()))?
            .map_err(|e| Error::Connection(format!("websocket handshake failed: {e}")))?;

        let (mut sink, stream) = ws.split();

        let setup_json = serde_json::to_string(&SetupMessage::from(setup))?;
        sink.send(Message::Text(setup_json))
            .await
            .map_err(|e| Error::Connection(format!("failed to send setup: {e}")))?;

        tracing::debug!(model = %setup.model, voice = %setup.voice, "live setup sent");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(read_loop(stream, events_tx));
        let writer = tokio::spawn(write_loop(sink, outbound_rx));

        Ok(LiveSession::new(
            outbound_tx,
            events_rx,
            Some(writer),
            self.close_timeout,
        ))
    }
}

/// Forward websocket frames as session events until the stream ends
async fn read_loop(mut stream: SplitStream<WsStream>, events: mpsc::UnboundedSender<LiveEvent>) {
    while let Some(message) = stream.next().await {
        let parsed = match message {
            Ok(Message::Text(text)) => events_from_frame(text.as_bytes()),
            Ok(Message::Binary(bytes)) => events_from_frame(&bytes),
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty());
                tracing::debug!(?reason, "live session closed by remote");
                let _ = events.send(LiveEvent::Closed { reason });
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "live transport error");
                let _ = events.send(LiveEvent::Error(e.to_string()));
                return;
            }
        };

        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring server message");
                continue;
            }
        };

        for event in parsed {
            if events.send(event).is_err() {
                return;
            }
        }
    }

    let _ = events.send(LiveEvent::Closed { reason: None });
}

/// Serialize queued audio onto the websocket until closed
async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Audio(audio) => {
                let json = match serde_json::to_string(&RealtimeInputMessage::from(audio)) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to serialize audio frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json)).await {
                    tracing::warn!(error = %e, "failed to send audio frame");
                    break;
                }
            }
            Outbound::Close => break,
        }
    }

    if let Err(e) = sink.close().await {
        tracing::debug!(error = %e, "websocket close failed");
    }
}

/// Turn one JSON frame into session events
///
/// # Errors
///
/// Returns `Protocol` if the frame is not a server message
fn events_from_frame(bytes: &[u8]) -> Result<Vec<LiveEvent>> {
    let message: ServerMessage = serde_json::from_slice(bytes)
        .map_err(|e| Error::Protocol(format!("unparseable frame ({} bytes): {e}", bytes.len())))?;

    let mut events = Vec::with_capacity(2);

    if message.setup_complete.is_some() {
        events.push(LiveEvent::Opened);
    }

    if let Some(go_away) = &message.go_away {
        tracing::warn!(time_left = ?go_away.time_left, "server will disconnect soon");
    }

    if let Some(content) = message.server_content {
        events.push(LiveEvent::Message(ServerMessage::content(content)));
    }

    Ok(events)
}
