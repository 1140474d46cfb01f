//! Audio decode and playback primitives.

pub mod chunk;
pub mod pcm;
#[cfg(feature = "cpal-audio")]
pub mod playback;
pub mod voice;
pub mod wav;

pub use chunk::AudioChunk;
pub use voice::{MockVoice, VoicePool, VoiceSink, mock_pool};
