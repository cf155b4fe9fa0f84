//! Character Call - real-time voice conversations with AI characters
//!
//! This library provides the voice-call subsystem behind the character feed:
//! - Microphone capture chunked into fixed-size frames
//! - PCM codec for the realtime wire format
//! - Gapless playback scheduling with instant interruption
//! - Call session lifecycle against a live conversational model
//! - Streaming transcript aggregation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  frames  ┌────────┐  base64 PCM  ┌──────────────────┐
//! │   Capture    ├─────────►│ Codec  ├─────────────►│                  │
//! └──────────────┘          └────────┘              │  Call Controller │◄──► Live model
//! ┌──────────────┐  chunks  ┌────────┐              │                  │
//! │  Scheduler   │◄─────────┤ Codec  │◄─────────────┤                  │
//! └──────────────┘          └────────┘   transcript └────────┬─────────┘
//!                                       ┌────────────────────▼─────────┐
//!                                       │     Transcript Aggregator    │
//!                                       └──────────────────────────────┘
//! ```

pub mod call;
pub mod config;
pub mod error;
pub mod live;
pub mod story;
pub mod voice;

pub use call::{
    CallCommand, CallController, CallExit, CallNotice, CallSnapshot, CallStats, CallStatus, Speaker,
    TranscriptAggregator, TranscriptTurn,
};
pub use config::Config;
pub use error::{Error, Result};
pub use live::{GeminiLiveConnector, LiveConnector, LiveEvent, LiveSession, LiveSetup};
pub use story::{CharacterProfile, Feed, MemoryStoryStore, Story, StoryStatus, StoryStore};
pub use voice::{AudioBackend, AudioChunk, CpalBackend, PlaybackHandle, PlaybackScheduler};
