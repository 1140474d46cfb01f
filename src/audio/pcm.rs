//! Self-describing PCM container codec.
//!
//! The server wraps each sentence's audio in a tiny container: an 8-byte
//! little-endian header (`sample_rate: u32`, `channels: u16`,
//! `bits_per_sample: u16`) followed by 16-bit little-endian PCM samples.
//! Decoding normalizes samples to f32 in [-1, 1]; encoding reverses that
//! within 1 LSB, which the round-trip test pins down.

use crate::defaults::PCM_BITS_PER_SAMPLE;
use crate::error::{Result, VoxtalkError};

/// Size of the container header in bytes.
pub const HEADER_LEN: usize = 8;

const NORM: f32 = 32768.0;

/// A decoded PCM payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples normalized to [-1, 1].
    pub samples: Vec<f32>,
}

/// Decodes a container payload into normalized samples.
///
/// # Errors
/// Returns `VoxtalkError::PayloadDecode` for a short header, an unsupported
/// bit depth or channel count, a zero sample rate, or a truncated sample
/// region. `sequence_id` only labels the error.
pub fn decode(sequence_id: u64, payload: &[u8]) -> Result<PcmAudio> {
    if payload.len() < HEADER_LEN {
        return Err(VoxtalkError::PayloadDecode {
            sequence_id,
            message: format!("container too short: {} bytes", payload.len()),
        });
    }

    // Header is fixed-width little-endian; indexing is safe after the
    // length check above.
    let sample_rate = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let channels = u16::from_le_bytes([payload[4], payload[5]]);
    let bits_per_sample = u16::from_le_bytes([payload[6], payload[7]]);

    if sample_rate == 0 {
        return Err(VoxtalkError::PayloadDecode {
            sequence_id,
            message: "sample rate is zero".to_string(),
        });
    }
    if channels == 0 || channels > 2 {
        return Err(VoxtalkError::PayloadDecode {
            sequence_id,
            message: format!("unsupported channel count: {channels}"),
        });
    }
    if bits_per_sample != PCM_BITS_PER_SAMPLE {
        return Err(VoxtalkError::PayloadDecode {
            sequence_id,
            message: format!("unsupported bit depth: {bits_per_sample}"),
        });
    }

    let body = &payload[HEADER_LEN..];
    if body.len() % 2 != 0 {
        return Err(VoxtalkError::PayloadDecode {
            sequence_id,
            message: format!("odd PCM byte count: {}", body.len()),
        });
    }

    let samples = body
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / NORM)
        .collect();

    Ok(PcmAudio {
        sample_rate,
        channels,
        samples,
    })
}

/// Encodes normalized samples into the container format.
///
/// Out-of-range samples are clamped to [-1, 1] before quantization.
pub fn encode(audio: &PcmAudio) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + audio.samples.len() * 2);
    out.extend_from_slice(&audio.sample_rate.to_le_bytes());
    out.extend_from_slice(&audio.channels.to_le_bytes());
    out.extend_from_slice(&PCM_BITS_PER_SAMPLE.to_le_bytes());

    for &sample in &audio.samples {
        let quantized = (sample.clamp(-1.0, 1.0) * NORM)
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        out.extend_from_slice(&quantized.to_le_bytes());
    }
    out
}
