//! Audio playback to speakers
//!
//! The output stream renders a [`Mixer`] whose frame counter is the device
//! clock. Scheduled clips sit at absolute frame positions and are summed
//! into the output as the counter passes over them.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use crate::voice::{AudioChunk, PlaybackHandle, PlaybackSink};
use crate::{Error, Result};

struct Clip {
    handle: PlaybackHandle,
    start_frame: u64,
    channels: Vec<Vec<f32>>,
}

impl Clip {
    fn len(&self) -> u64 {
        self.channels.first().map_or(0, |c| c.len() as u64)
    }

    fn end_frame(&self) -> u64 {
        self.start_frame + self.len()
    }

    /// Sample for an output channel; mono clips fan out to every channel
    fn sample(&self, channel: usize, index: usize) -> f32 {
        let source = channel.min(self.channels.len() - 1);
        self.channels[source][index]
    }
}

/// Frame-accurate clip mixer driven by the output callback
pub struct Mixer {
    sample_rate: u32,
    position: u64,
    clips: Vec<Clip>,
}

impl Mixer {
    /// Create an empty mixer at `sample_rate`
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            position: 0,
            clips: Vec::new(),
        }
    }

    /// Device clock in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn current_time(&self) -> f64 {
        self.position as f64 / f64::from(self.sample_rate)
    }

    /// Frames rendered so far
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Place a chunk at an absolute time in seconds
    ///
    /// A start already rendered past is moved up to the current position.
    /// Returns the time the chunk will actually start.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn schedule(&mut self, handle: PlaybackHandle, chunk: AudioChunk, start_at: f64) -> f64 {
        if chunk.is_empty() {
            // Nothing to render; complete on the next callback
            self.clips.push(Clip {
                handle,
                start_frame: self.position,
                channels: vec![Vec::new()],
            });
            return self.current_time();
        }

        let requested = (start_at.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        let start_frame = requested.max(self.position);
        self.clips.push(Clip {
            handle,
            start_frame,
            channels: chunk.channels,
        });
        start_frame as f64 / f64::from(self.sample_rate)
    }

    /// Drop a clip without reporting completion
    pub fn stop(&mut self, handle: PlaybackHandle) {
        self.clips.retain(|c| c.handle != handle);
    }

    /// Number of clips not yet finished
    #[must_use]
    pub fn pending(&self) -> usize {
        self.clips.len()
    }

    /// Fill an interleaved output buffer and advance the clock
    ///
    /// `finished` is called for every clip whose last frame was rendered.
    #[allow(clippy::cast_possible_truncation)]
    pub fn render(
        &mut self,
        out: &mut [f32],
        channels: usize,
        finished: &mut impl FnMut(PlaybackHandle),
    ) {
        out.fill(0.0);
        let channels = channels.max(1);
        let frames = (out.len() / channels) as u64;
        let window_end = self.position + frames;

        for clip in &self.clips {
            let from = clip.start_frame.max(self.position);
            let to = clip.end_frame().min(window_end);
            for t in from..to {
                let out_index = ((t - self.position) as usize) * channels;
                let clip_index = (t - clip.start_frame) as usize;
                for c in 0..channels {
                    out[out_index + c] += clip.sample(c, clip_index);
                }
            }
        }

        self.position = window_end;
        let position = self.position;
        self.clips.retain(|clip| {
            if clip.end_frame() <= position {
                finished(clip.handle);
                false
            } else {
                true
            }
        });
    }
}

/// Plays scheduled chunks on the default output device
pub struct CpalOutput {
    mixer: Arc<Mutex<Mixer>>,
    stream: Option<Stream>,
}

impl CpalOutput {
    /// Open the default output device at `sample_rate`
    ///
    /// Finished handles are sent on `completions`.
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn open(sample_rate: u32, completions: mpsc::UnboundedSender<PlaybackHandle>) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| c.channels() == 1 && supports(c))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| c.channels() == 2 && supports(c))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config: StreamConfig = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();
        let channels = usize::from(config.channels);

        let mixer = Arc::new(Mutex::new(Mixer::new(sample_rate)));
        let render_mixer = Arc::clone(&mixer);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if let Ok(mut mixer) = render_mixer.lock() {
                        mixer.render(data, channels, &mut |handle| {
                            let _ = completions.send(handle);
                        });
                    } else {
                        data.fill(0.0);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "audio playback initialized"
        );

        Ok(Self {
            mixer,
            stream: Some(stream),
        })
    }
}

impl PlaybackSink for CpalOutput {
    fn current_time(&self) -> f64 {
        self.mixer.lock().map(|m| m.current_time()).unwrap_or(0.0)
    }

    fn schedule(&mut self, handle: PlaybackHandle, chunk: AudioChunk, start_at: f64) -> Result<f64> {
        if self.stream.is_none() {
            return Err(Error::Audio("output device closed".to_string()));
        }
        let started = self
            .mixer
            .lock()
            .map_err(|_| Error::Audio("mixer lock poisoned".to_string()))?
            .schedule(handle, chunk, start_at);
        Ok(started)
    }

    fn stop(&mut self, handle: PlaybackHandle) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.stop(handle);
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("output device released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: u64) -> PlaybackHandle {
        PlaybackHandle::from_raw(id)
    }

    #[test]
    fn test_back_to_back_clips_render_contiguously() {
        let mut mixer = Mixer::new(4);
        mixer.schedule(handle(1), AudioChunk::mono(vec![0.1, 0.2], 4), 0.0);
        mixer.schedule(handle(2), AudioChunk::mono(vec![0.3, 0.4], 4), 0.5);

        let mut out = [0.0f32; 6];
        let mut done = Vec::new();
        mixer.render(&mut out, 1, &mut |h| done.push(h));

        assert_eq!(out, [0.1, 0.2, 0.3, 0.4, 0.0, 0.0]);
        assert_eq!(done, [handle(1), handle(2)]);
        assert_eq!(mixer.pending(), 0);
        assert!((mixer.current_time() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clip_spans_callbacks() {
        let mut mixer = Mixer::new(4);
        mixer.schedule(handle(1), AudioChunk::mono(vec![0.5; 3], 4), 0.25);

        let mut done = Vec::new();
        let mut out = [0.0f32; 2];
        mixer.render(&mut out, 1, &mut |h| done.push(h));
        assert_eq!(out, [0.0, 0.5]);
        assert!(done.is_empty());

        mixer.render(&mut out, 1, &mut |h| done.push(h));
        assert_eq!(out, [0.5, 0.5]);
        assert_eq!(done, [handle(1)]);
    }

    #[test]
    fn test_mono_fans_out_to_stereo() {
        let mut mixer = Mixer::new(4);
        mixer.schedule(handle(1), AudioChunk::mono(vec![0.25], 4), 0.0);

        let mut out = [0.0f32; 2];
        mixer.render(&mut out, 2, &mut |_| {});
        assert_eq!(out, [0.25, 0.25]);
    }

    #[test]
    fn test_stopped_clip_is_silent_and_unreported() {
        let mut mixer = Mixer::new(4);
        mixer.schedule(handle(1), AudioChunk::mono(vec![0.5; 4], 4), 0.0);
        mixer.stop(handle(1));

        let mut out = [1.0f32; 4];
        let mut done = Vec::new();
        mixer.render(&mut out, 1, &mut |h| done.push(h));
        assert_eq!(out, [0.0; 4]);
        assert!(done.is_empty());
    }

    #[test]
    fn test_past_start_plays_immediately() {
        let mut mixer = Mixer::new(4);
        let mut out = [0.0f32; 4];
        mixer.render(&mut out, 1, &mut |_| {});

        let started = mixer.schedule(handle(1), AudioChunk::mono(vec![0.5], 4), 0.0);
        assert!((started - 1.0).abs() < f64::EPSILON);
        mixer.render(&mut out, 1, &mut |_| {});
        assert_eq!(out[0], 0.5);
    }
}
