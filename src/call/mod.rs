//! Real-time voice calls with a character
//!
//! [`CallController`] owns the microphone, the speaker and the live session
//! for one conversation and publishes a [`CallSnapshot`] the UI renders.

mod controller;
mod session;
mod state;
mod transcript;

pub use controller::{CallController, CallExit};
pub use session::CallResources;
pub use state::{CallCommand, CallNotice, CallSnapshot, CallStats, CallStatus};
pub use transcript::{Speaker, TranscriptAggregator, TranscriptTurn};
