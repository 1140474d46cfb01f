//! Playback voice abstraction.
//!
//! A voice renders one chunk at a time. The pool keeps a few voices warm so
//! consecutive chunks never wait on device setup, but the scheduler only ever
//! plays the sequential head on one voice at a time.

use crate::audio::chunk::AudioChunk;
use crate::error::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A playback resource capable of rendering one audio chunk at a time.
pub trait VoiceSink: Send + Sync {
    /// Begins playback of the chunk. Returns immediately; the caller tracks
    /// the chunk's duration itself.
    fn begin(&self, chunk: &AudioChunk) -> Result<()>;

    /// Halts any playback on this voice immediately. Idempotent.
    fn stop(&self);
}

/// Fixed pool of playback voices, acquired round-robin.
pub struct VoicePool<V: VoiceSink> {
    voices: Vec<Arc<V>>,
    next: AtomicUsize,
}

impl<V: VoiceSink> VoicePool<V> {
    /// Builds a pool from pre-constructed voices.
    pub fn new(voices: Vec<Arc<V>>) -> Self {
        Self {
            voices,
            next: AtomicUsize::new(0),
        }
    }

    /// Number of voices in the pool.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    /// Returns true if the pool holds no voices.
    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Acquires the next voice in rotation.
    ///
    /// Playback is strictly sequential, so rotation alone guarantees the
    /// previous use of the returned voice has finished (the pool holds at
    /// least one voice, enforced by config validation).
    pub fn acquire(&self) -> Arc<V> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.voices.len();
        self.voices[index].clone()
    }

    /// Stops every voice in the pool. Idempotent.
    pub fn stop_all(&self) {
        for voice in &self.voices {
            voice.stop();
        }
    }
}

/// Voice that renders nothing but tracks calls. Used in tests and as the
/// headless fallback when the `cpal-audio` feature is off.
#[derive(Default)]
pub struct MockVoice {
    playing: AtomicBool,
    begun: Mutex<Vec<u64>>,
    stops: AtomicUsize,
}

impl MockVoice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence ids passed to `begin`, in call order.
    pub fn begun_ids(&self) -> Vec<u64> {
        self.begun.lock().expect("mock lock poisoned").clone()
    }

    /// Number of times `stop` was called.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// True while a begin has not been followed by a stop.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}

impl VoiceSink for MockVoice {
    fn begin(&self, chunk: &AudioChunk) -> Result<()> {
        self.begun
            .lock()
            .expect("mock lock poisoned")
            .push(chunk.sequence_id);
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
    }
}

/// Builds a pool of mock voices (headless playback).
pub fn mock_pool(size: usize) -> VoicePool<MockVoice> {
    let voices = (0..size.max(1)).map(|_| Arc::new(MockVoice::new())).collect();
    VoicePool::new(voices)
}
