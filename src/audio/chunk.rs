//! Decoded audio chunk carrier.

use std::time::{Duration, Instant};

/// One sentence worth of decoded audio, keyed by its sequence id.
///
/// A chunk is exclusively owned by whichever component currently holds it
/// (the reassembly buffer while queued, the scheduler while playing) and is
/// dropped immediately after its single playback or eviction.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Producer-assigned sequence id (starts at 1).
    pub sequence_id: u64,
    /// Interleaved samples normalized to [-1, 1].
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Text associated with this chunk, if the server sent any.
    pub text: String,
    /// When this chunk was decoded on the client.
    pub arrived: Instant,
}

impl AudioChunk {
    /// Creates a chunk stamped with the current time.
    pub fn new(
        sequence_id: u64,
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
        text: String,
    ) -> Self {
        Self {
            sequence_id,
            samples,
            sample_rate,
            channels,
            text,
            arrived: Instant::now(),
        }
    }

    /// Playback duration of this chunk.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}
