//! Voice processing module
//!
//! Handles microphone capture, the PCM wire codec, and scheduled playback.
//! Device access goes through [`AudioBackend`] so a call can run against
//! real cpal devices or an in-memory backend.

mod capture;
pub mod codec;
mod playback;
mod scheduler;

use tokio::sync::mpsc;

pub use capture::{AudioCapture, AudioInput, CaptureHandle, FrameCallback, FrameChunker, samples_to_wav};
pub use codec::{AudioChunk, INPUT_MIME_TYPE, RealtimeAudio, decode_inbound, encode_outbound};
pub use playback::{CpalOutput, Mixer};
pub use scheduler::{PlaybackHandle, PlaybackScheduler, PlaybackSink};

use crate::Result;

/// Opens the two device contexts a call needs
pub trait AudioBackend {
    /// Microphone device context
    type Input: AudioInput;

    /// Speaker device context
    type Output: PlaybackSink;

    /// Acquire the microphone
    ///
    /// # Errors
    ///
    /// Returns `MediaAccess` if permission is denied or the device is busy
    fn open_input(&self, sample_rate: u32, frame_len: usize) -> Result<Self::Input>;

    /// Open the speaker; finished handles are sent on `completions`
    ///
    /// # Errors
    ///
    /// Returns `Audio` if the device cannot be opened
    fn open_output(
        &self,
        sample_rate: u32,
        completions: mpsc::UnboundedSender<PlaybackHandle>,
    ) -> Result<Self::Output>;
}

/// Default host devices via cpal
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    type Input = AudioCapture;
    type Output = CpalOutput;

    fn open_input(&self, sample_rate: u32, frame_len: usize) -> Result<AudioCapture> {
        AudioCapture::open(sample_rate, frame_len)
    }

    fn open_output(
        &self,
        sample_rate: u32,
        completions: mpsc::UnboundedSender<PlaybackHandle>,
    ) -> Result<CpalOutput> {
        CpalOutput::open(sample_rate, completions)
    }
}
