//! WAV dumps of decoded chunks, for debugging the remote service's audio.

use crate::audio::chunk::AudioChunk;
use crate::error::{Result, VoxtalkError};
use std::path::{Path, PathBuf};

/// Writes a decoded chunk to `<dir>/chunk-<id>.wav` as 16-bit PCM.
///
/// Returns the path written. The directory is created if missing.
pub fn dump_chunk(dir: &Path, chunk: &AudioChunk) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("chunk-{}.wav", chunk.sequence_id));

    let spec = hound::WavSpec {
        channels: chunk.channels,
        sample_rate: chunk.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec).map_err(|e| {
        VoxtalkError::Other(format!("failed to create {}: {e}", path.display()))
    })?;
    for &sample in &chunk.samples {
        let quantized = (sample.clamp(-1.0, 1.0) * 32768.0)
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        writer
            .write_sample(quantized)
            .map_err(|e| VoxtalkError::Other(format!("failed to write WAV sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| VoxtalkError::Other(format!("failed to finalize WAV: {e}")))?;

    Ok(path)
}
