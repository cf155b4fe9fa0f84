//! Realtime conversational model connection
//!
//! A [`LiveSession`] is the client's half of one bidirectional stream:
//! outbound audio goes through an unbounded queue to a writer task, and
//! inbound protocol events arrive on a receiver. Transports only have to
//! feed those two channels, which keeps the call controller independent of
//! the websocket.

mod gemini;
pub mod protocol;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use gemini::GeminiLiveConnector;
pub use protocol::{LiveSetup, ServerContent, ServerMessage};

use crate::voice::RealtimeAudio;
use crate::{Error, Result};

/// Inbound event from the remote session
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Remote acknowledged the session setup
    Opened,
    /// Protocol message
    Message(ServerMessage),
    /// Remote closed the stream
    Closed { reason: Option<String> },
    /// Transport failure
    Error(String),
}

/// Message queued for the transport writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// One captured frame
    Audio(RealtimeAudio),
    /// Close the stream gracefully
    Close,
}

/// Transport side of a session created with [`channel`]
pub struct LiveChannels {
    /// Messages the client sent
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    /// Deliver events to the client
    pub events: mpsc::UnboundedSender<LiveEvent>,
}

/// Create a session wired to in-memory channels
#[must_use]
pub fn channel(close_timeout: Duration) -> (LiveSession, LiveChannels) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let session = LiveSession::new(outbound_tx, events_rx, None, close_timeout);
    let channels = LiveChannels {
        outbound: outbound_rx,
        events: events_tx,
    };
    (session, channels)
}

/// Client half of one bidirectional stream
pub struct LiveSession {
    outbound: mpsc::UnboundedSender<Outbound>,
    events: mpsc::UnboundedReceiver<LiveEvent>,
    writer: Option<JoinHandle<()>>,
    close_timeout: Duration,
    closed: bool,
}

impl LiveSession {
    /// Assemble a session from its channels and optional writer task
    #[must_use]
    pub const fn new(
        outbound: mpsc::UnboundedSender<Outbound>,
        events: mpsc::UnboundedReceiver<LiveEvent>,
        writer: Option<JoinHandle<()>>,
        close_timeout: Duration,
    ) -> Self {
        Self {
            outbound,
            events,
            writer,
            close_timeout,
            closed: false,
        }
    }

    /// Queue one audio frame for transmission
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the session is closed
    pub fn send_audio(&self, audio: RealtimeAudio) -> Result<()> {
        if self.closed {
            return Err(Error::Connection("session closed".to_string()));
        }
        self.outbound
            .send(Outbound::Audio(audio))
            .map_err(|_| Error::Connection("transport writer stopped".to_string()))
    }

    /// Wait for the next inbound event
    ///
    /// Returns `None` once the transport has gone away.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }

    /// Whether `close` has been called
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the stream and wait for the writer to finish
    ///
    /// Calling this more than once is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the writer does not finish within the close
    /// timeout or panicked
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.events.close();

        // Writer may already be gone after a remote close
        let _ = self.outbound.send(Outbound::Close);

        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.close_timeout, &mut writer).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::Connection(format!("transport writer failed: {e}"))),
            Err(_) => {
                writer.abort();
                Err(Error::Connection("timed out closing session".to_string()))
            }
        }
    }
}

/// Opens sessions with a live conversational model
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Connect and send the session setup
    ///
    /// The returned session emits [`LiveEvent::Opened`] once the remote
    /// acknowledges the setup.
    ///
    /// # Errors
    ///
    /// Returns `Connection` on missing credentials or handshake failure
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveSession>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio() -> RealtimeAudio {
        RealtimeAudio {
            data: "AAA=".to_string(),
            mime_type: crate::voice::INPUT_MIME_TYPE.to_string(),
        }
    }

    #[tokio::test]
    async fn test_channel_round_trip() {
        let (mut session, mut transport) = channel(Duration::from_millis(50));

        session.send_audio(audio()).unwrap();
        assert_eq!(transport.outbound.recv().await, Some(Outbound::Audio(audio())));

        transport.events.send(LiveEvent::Opened).unwrap();
        assert_eq!(session.recv().await, Some(LiveEvent::Opened));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut session, mut transport) = channel(Duration::from_millis(50));

        session.close().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(transport.outbound.recv().await, Some(Outbound::Close));
        assert!(session.is_closed());
        assert!(session.send_audio(audio()).is_err());
    }

    #[tokio::test]
    async fn test_close_times_out_on_stuck_writer() {
        let (outbound, _outbound_rx) = mpsc::unbounded_channel();
        let (_events_tx, events) = mpsc::unbounded_channel();
        let writer = tokio::spawn(std::future::pending::<()>());
        let mut session = LiveSession::new(outbound, events, Some(writer), Duration::from_millis(10));

        assert!(matches!(session.close().await, Err(Error::Connection(_))));
    }
}
