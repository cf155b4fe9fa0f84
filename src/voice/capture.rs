//! Audio capture from microphone
//!
//! Device callbacks deliver buffers of arbitrary size; [`FrameChunker`]
//! regroups them into fixed-size mono frames before they leave the audio
//! thread, so outbound frames always have the same length and stay in
//! capture order.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::voice::codec::sample_to_i16;
use crate::{Error, Result};

/// Receives each completed frame on the capture thread
pub type FrameCallback = Box<dyn FnMut(Vec<f32>) + Send + 'static>;

/// An acquired microphone that can produce frames
pub trait AudioInput {
    /// Running capture stream
    type Handle;

    /// Begin producing frames
    ///
    /// # Errors
    ///
    /// Returns `MediaAccess` if the stream cannot be started
    fn start(&mut self, on_frame: FrameCallback) -> Result<Self::Handle>;

    /// Stop a running stream and release it
    fn stop(&mut self, handle: Self::Handle);

    /// Release the device; later `start` calls fail
    fn close(&mut self);
}

/// Regroups device buffers into fixed-size mono frames
#[derive(Debug)]
pub struct FrameChunker {
    frame_len: usize,
    channels: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    /// Create a chunker for interleaved input with `channels` channels
    #[must_use]
    pub fn new(frame_len: usize, channels: usize) -> Self {
        Self {
            frame_len: frame_len.max(1),
            channels: channels.max(1),
            pending: Vec::with_capacity(frame_len),
        }
    }

    /// Feed interleaved samples, emitting every completed frame in order
    #[allow(clippy::cast_precision_loss)]
    pub fn push(&mut self, data: &[f32], emit: &mut impl FnMut(Vec<f32>)) {
        for frame in data.chunks(self.channels) {
            let sample = if self.channels == 1 {
                frame[0]
            } else {
                frame.iter().sum::<f32>() / frame.len() as f32
            };
            self.pending.push(sample);

            if self.pending.len() == self.frame_len {
                let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_len));
                emit(full);
            }
        }
    }

    /// Samples waiting for a full frame
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Samples per emitted frame
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        self.frame_len
    }
}

/// Running cpal input stream; the microphone is released when dropped
pub struct CaptureHandle {
    stream: Stream,
}

/// Captures audio from the default input device
pub struct AudioCapture {
    device: Option<Device>,
    config: StreamConfig,
    frame_len: usize,
}

impl AudioCapture {
    /// Acquire the default input device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns `MediaAccess` if no suitable microphone is available
    pub fn open(sample_rate: u32, frame_len: usize) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::MediaAccess("no input device available".to_string()))?;

        let supports = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::MediaAccess(e.to_string()))?
            .find(|c| c.channels() == 1 && supports(c))
            .or_else(|| {
                // Fallback: any channel count, downmixed by the chunker
                device.supported_input_configs().ok()?.find(supports)
            })
            .ok_or_else(|| {
                Error::MediaAccess(format!("no input config supports {sample_rate} Hz"))
            })?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            frame_len,
            "audio capture initialized"
        );

        Ok(Self {
            device: Some(device),
            config,
            frame_len,
        })
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl AudioInput for AudioCapture {
    type Handle = CaptureHandle;

    fn start(&mut self, mut on_frame: FrameCallback) -> Result<CaptureHandle> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| Error::MediaAccess("input device closed".to_string()))?;

        let mut chunker = FrameChunker::new(self.frame_len, usize::from(self.config.channels));

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    chunker.push(data, &mut on_frame);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::MediaAccess(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::MediaAccess(e.to_string()))?;

        tracing::debug!("audio capture started");
        Ok(CaptureHandle { stream })
    }

    fn stop(&mut self, handle: CaptureHandle) {
        if let Err(e) = handle.stream.pause() {
            tracing::debug!(error = %e, "failed to pause capture stream");
        }
        drop(handle);
        tracing::debug!("audio capture stopped");
    }

    fn close(&mut self) {
        if self.device.take().is_some() {
            tracing::debug!("input device released");
        }
    }
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample_to_i16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
