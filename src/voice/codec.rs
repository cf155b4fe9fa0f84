//! PCM codec for the realtime wire format
//!
//! Outbound: normalized f32 samples → signed 16-bit little-endian PCM →
//! base64, tagged with the 16kHz mono MIME type.
//! Inbound: base64 → 16-bit little-endian PCM → per-channel f32 buffers.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// MIME type of outbound microphone audio
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Scale between normalized floats and 16-bit integers
const PCM_SCALE: f32 = 32768.0;

/// Outbound transport envelope for one captured frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeAudio {
    /// Base64 PCM bytes
    pub data: String,
    pub mime_type: String,
}

/// A decoded piece of synthesized speech
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// One buffer per channel, all the same length
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Build a mono chunk
    #[must_use]
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// Samples per channel
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Playback length in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Whether the chunk holds no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }
}

/// Convert one normalized sample to 16-bit PCM
///
/// Values at or beyond full scale saturate at the i16 limits.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn sample_to_i16(sample: f32) -> i16 {
    (sample * PCM_SCALE) as i16
}

/// Convert f32 samples to signed 16-bit little-endian PCM bytes
#[must_use]
pub fn samples_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| sample_to_i16(s).to_le_bytes())
        .collect()
}

/// Reinterpret PCM bytes as 16-bit little-endian samples
///
/// # Errors
///
/// Returns `Decode` if the byte count is odd
pub fn pcm16_to_i16(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Decode(format!(
            "PCM payload has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}

/// De-interleave 16-bit PCM bytes into normalized per-channel buffers
///
/// A trailing partial frame is ignored.
///
/// # Errors
///
/// Returns `Decode` on odd byte counts or zero channels
pub fn pcm16_to_channels(bytes: &[u8], channel_count: usize) -> Result<Vec<Vec<f32>>> {
    if channel_count == 0 {
        return Err(Error::Decode("channel count must be non-zero".to_string()));
    }

    let samples = pcm16_to_i16(bytes)?;
    let frame_count = samples.len() / channel_count;

    let channels = (0..channel_count)
        .map(|channel| {
            (0..frame_count)
                .map(|i| f32::from(samples[i * channel_count + channel]) / PCM_SCALE)
                .collect()
        })
        .collect();

    Ok(channels)
}

/// Wrap a captured frame in the outbound envelope
#[must_use]
pub fn encode_outbound(samples: &[f32]) -> RealtimeAudio {
    RealtimeAudio {
        data: BASE64.encode(samples_to_pcm16(samples)),
        mime_type: INPUT_MIME_TYPE.to_string(),
    }
}

/// Decode a base64 PCM payload into a playable chunk
///
/// # Errors
///
/// Returns `Decode` if the payload is not valid base64 PCM
pub fn decode_inbound(data: &str, sample_rate: u32, channel_count: usize) -> Result<AudioChunk> {
    let bytes = BASE64
        .decode(data.trim())
        .map_err(|e| Error::Decode(format!("invalid base64 audio: {e}")))?;

    Ok(AudioChunk {
        channels: pcm16_to_channels(&bytes, channel_count)?,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scales_and_tags() {
        let envelope = encode_outbound(&[0.0, 0.5, -0.5, -1.0]);
        assert_eq!(envelope.mime_type, "audio/pcm;rate=16000");

        let bytes = BASE64.decode(&envelope.data).unwrap();
        let samples = pcm16_to_i16(&bytes).unwrap();
        assert_eq!(samples, [0, 16384, -16384, -32768]);
    }

    #[test]
    fn test_full_scale_saturates() {
        assert_eq!(sample_to_i16(1.0), i16::MAX);
        assert_eq!(sample_to_i16(-1.0), i16::MIN);
    }

    #[test]
    fn test_little_endian_layout() {
        assert_eq!(samples_to_pcm16(&[0.5]), [0x00, 0x40]);
    }

    #[test]
    fn test_deinterleave_stereo() {
        let bytes: Vec<u8> = [100i16, -100, 200, -200]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();

        let channels = pcm16_to_channels(&bytes, 2).unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0], [100.0 / 32768.0, 200.0 / 32768.0]);
        assert_eq!(channels[1], [-100.0 / 32768.0, -200.0 / 32768.0]);
    }

    #[test]
    fn test_odd_length_rejected() {
        let data = BASE64.encode([1u8, 2, 3]);
        assert!(matches!(
            decode_inbound(&data, 24_000, 1),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        assert!(matches!(
            decode_inbound("not base64!!", 24_000, 1),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_chunk_duration() {
        let chunk = AudioChunk::mono(vec![0.0; 12_000], 24_000);
        assert!((chunk.duration_secs() - 0.5).abs() < f64::EPSILON);
        assert!(!chunk.is_empty());
    }
}
