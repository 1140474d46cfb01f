//! Reassembly buffer: absorbs chunks in any arrival order and releases them
//! strictly by ascending sequence id.
//!
//! Shared between the session controller (producer side, `add`) and the
//! playback scheduler (consumer side, `try_take_next`/`advance`). A `Notify`
//! wakes the consumer on every insert so contiguity waits are event-driven.

use crate::audio::chunk::AudioChunk;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tokio::sync::Notify;

/// First sequence id of every session.
const FIRST_SEQUENCE_ID: u64 = 1;

struct Inner {
    chunks: BTreeMap<u64, AudioChunk>,
    next_expected: u64,
}

pub struct ReassemblyBuffer {
    inner: Mutex<Inner>,
    added: Notify,
    capacity: usize,
}

/// Outcome of an `add` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Chunk inserted.
    Inserted,
    /// Chunk inserted after evicting the entry with this sequence id (the
    /// oldest arrival in the buffer).
    Evicted(u64),
    /// A chunk with this id was already buffered; the new one replaced it.
    Replaced,
    /// The id is below `next_expected` (already played or skipped); the
    /// chunk was dropped. Buffering it would block draining forever.
    Stale,
}

impl ReassemblyBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                chunks: BTreeMap::new(),
                next_expected: FIRST_SEQUENCE_ID,
            }),
            added: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Inserts a chunk keyed by its sequence id.
    ///
    /// At capacity, the entry with the oldest arrival time is evicted first
    /// so memory stays bounded under a runaway producer. A duplicate id
    /// replaces the buffered chunk in place without evicting anything.
    pub fn add(&self, chunk: AudioChunk) -> AddOutcome {
        let outcome = {
            let mut inner = self.lock();
            if chunk.sequence_id < inner.next_expected {
                tracing::debug!(
                    "dropping stale chunk {} (next expected {})",
                    chunk.sequence_id,
                    inner.next_expected
                );
                return AddOutcome::Stale;
            }
            if inner.chunks.contains_key(&chunk.sequence_id) {
                inner.chunks.insert(chunk.sequence_id, chunk);
                AddOutcome::Replaced
            } else if inner.chunks.len() >= self.capacity {
                let oldest = inner
                    .chunks
                    .iter()
                    .min_by_key(|(_, c)| c.arrived)
                    .map(|(&id, _)| id);
                // Non-empty map at capacity >= 1, so oldest always exists.
                let evicted = match oldest {
                    Some(id) => {
                        inner.chunks.remove(&id);
                        id
                    }
                    None => unreachable!("buffer at capacity cannot be empty"),
                };
                tracing::warn!(
                    "reassembly buffer full, evicted chunk {evicted} for chunk {}",
                    chunk.sequence_id
                );
                inner.chunks.insert(chunk.sequence_id, chunk);
                AddOutcome::Evicted(evicted)
            } else {
                inner.chunks.insert(chunk.sequence_id, chunk);
                AddOutcome::Inserted
            }
        };
        self.added.notify_one();
        outcome
    }

    /// Removes and returns the chunk whose id equals `next_expected`, if
    /// buffered. The caller must call `advance` after handing the chunk off.
    pub fn try_take_next(&self) -> Option<AudioChunk> {
        let mut inner = self.lock();
        let key = inner.next_expected;
        inner.chunks.remove(&key)
    }

    /// Moves `next_expected` forward by one.
    pub fn advance(&self) {
        self.lock().next_expected += 1;
    }

    /// Jumps `next_expected` forward to `id` (used by the missing-chunk skip
    /// policy). Backward jumps are ignored: `next_expected` never decreases
    /// except through `reset`.
    pub fn skip_to(&self, id: u64) {
        let mut inner = self.lock();
        if id > inner.next_expected {
            inner.next_expected = id;
        }
    }

    /// Discards all buffered chunks and restarts the sequence. Idempotent.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.chunks.clear();
        inner.next_expected = FIRST_SEQUENCE_ID;
    }

    /// Smallest buffered sequence id, if any.
    pub fn min_buffered_id(&self) -> Option<u64> {
        self.lock().chunks.keys().next().copied()
    }

    pub fn next_expected(&self) -> u64 {
        self.lock().next_expected
    }

    pub fn len(&self) -> usize {
        self.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().chunks.is_empty()
    }

    /// Resolves on the next `add` after this call (one stored permit, so an
    /// insert between polling and awaiting is not lost).
    pub async fn added(&self) {
        self.added.notified().await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // The map stays structurally valid even if a holder panicked
        // mid-operation, so recover instead of poisoning every caller.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
