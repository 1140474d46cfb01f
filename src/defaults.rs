//! Default configuration constants for voxtalk.
//!
//! Shared between `config.rs` defaults and component-level `Default` impls
//! so the two never drift apart.

/// Marker prefix for event lines on the wire.
///
/// Every event the server emits is one UTF-8 line: this marker followed by a
/// JSON object. Bytes before the marker (keep-alives, blank lines) are
/// ignored.
pub const LINE_MARKER: &str = "data: ";

/// Default overall request timeout in seconds.
///
/// Bounds the whole streaming exchange; there is no per-chunk timeout since
/// forward progress is already limited by this and by the cancellation path.
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default reassembly buffer capacity, in chunks.
///
/// Bounds memory under a runaway producer. Ten chunks of a few seconds of
/// 16-bit PCM each is comfortably small while absorbing realistic network
/// reordering.
pub const BUFFER_CAPACITY: usize = 10;

/// Default wait before skipping a permanently missing sequence id, in
/// milliseconds.
///
/// When the next expected chunk never arrives (evicted, or its payload failed
/// to decode) the scheduler waits this long once later ids are available,
/// then skips ahead instead of stalling forever.
pub const MISSING_CHUNK_WAIT_MS: u64 = 2000;

/// Default number of playback voices in the pool.
///
/// The pool exists to avoid device-level stutter between consecutive chunks;
/// only one voice renders the sequential head at any instant.
pub const VOICE_POOL_SIZE: usize = 3;

/// Upper bound on bytes the decoder holds for an unterminated line.
///
/// A server that emits a marker and then never a newline would otherwise
/// grow the carry-over buffer without limit. The largest legitimate line is
/// one sentence of base64 audio, a few hundred KiB.
pub const DECODER_MAX_PENDING_BYTES: usize = 1024 * 1024;

/// Channel buffer size for raw transport fragments.
pub const TRANSPORT_CHANNEL_SIZE: usize = 64;

/// Channel buffer size for caller-facing session events.
pub const EVENT_CHANNEL_SIZE: usize = 64;

/// Expected bit depth of the PCM container payload.
pub const PCM_BITS_PER_SAMPLE: u16 = 16;
