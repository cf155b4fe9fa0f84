//! Observable call state, notices and commands

use serde::Serialize;

use super::transcript::TranscriptTurn;

/// Lifecycle of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// No call has been started
    #[default]
    Idle,
    /// Devices acquired, waiting for the remote to acknowledge
    Connecting,
    /// Audio is flowing both ways
    Connected,
    /// Torn down
    Ended,
}

impl CallStatus {
    /// Whether the call holds resources
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// Transmission counters for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CallStats {
    /// Frames delivered by the microphone
    pub frames_captured: u64,
    /// Frames handed to the transport
    pub frames_sent: u64,
    /// Audio chunks scheduled for playback
    pub chunks_scheduled: u64,
    /// Inbound chunks discarded (interrupted or undecodable)
    pub chunks_dropped: u64,
}

/// What the UI renders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallSnapshot {
    pub status: CallStatus,
    pub character_id: Option<String>,
    pub mic_muted: bool,
    pub ai_speaking: bool,
    pub transcripts: Vec<TranscriptTurn>,
    pub stats: CallStats,
}

/// One-shot notification for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallNotice {
    /// Microphone could not be acquired
    MediaAccessDenied(String),
    /// Connecting failed or the transport broke
    ConnectionFailed(String),
    /// Call finished and all resources were released
    Ended { reason: String },
}

/// Requests from the UI while a call is running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallCommand {
    SetMuted(bool),
    ToggleMute,
    /// Hang up
    End,
    /// The feed moved to another character; the call must end first
    SwitchCharacter(String),
}
