//! Caller-facing session events.
//!
//! The crate performs no rendering; callers (the CLI's `output` module, a
//! game loop, a UI) consume this stream however they like.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Session-level metadata forwarded from the server.
    Metadata { text: Option<String> },
    /// Text was generated for a sentence.
    TextGenerated { sequence_id: u64, text: String },
    /// A chunk began audible playback.
    ChunkStarted {
        sequence_id: u64,
        text: String,
        duration_ms: u64,
    },
    /// A chunk finished audible playback.
    ChunkCompleted { sequence_id: u64 },
    /// Every received chunk finished playback after the server signalled
    /// completion. Emitted exactly once per session.
    AllCompleted { chunks_played: u64 },
    /// A recoverable problem (dropped chunk, skipped gap, device hiccup).
    /// The session continues.
    Warning { message: String },
    /// The session failed. Terminal; forwarded verbatim from transport or
    /// server.
    SessionError { message: String },
}

impl SessionEvent {
    /// True for events that end the session's event stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::AllCompleted { .. } | SessionEvent::SessionError { .. }
        )
    }
}
