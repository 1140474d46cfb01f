//! Error types for voxtalk.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxtalkError {
    // Transport errors (fatal to a session)
    #[error("Failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("Stream timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Stream read failed: {message}")]
    Stream { message: String },

    // Protocol errors (recoverable, line granularity)
    #[error("Malformed stream line: {message}")]
    ProtocolDecode { message: String },

    // Payload errors (recoverable, chunk granularity)
    #[error("Failed to decode audio payload for sentence {sequence_id}: {message}")]
    PayloadDecode { sequence_id: u64, message: String },

    // Server-reported errors (fatal; the message is forwarded verbatim)
    #[error("{message}")]
    ServerReported { message: String },

    // Playback errors
    #[error("Audio output device error: {message}")]
    PlaybackDevice { message: String },

    #[error("Playback failed: {message}")]
    Playback { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl VoxtalkError {
    /// Returns true if this error ends the session (transport or server
    /// level). Recoverable decode errors are absorbed before they reach
    /// the session controller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VoxtalkError::Connect { .. }
                | VoxtalkError::Timeout { .. }
                | VoxtalkError::Stream { .. }
                | VoxtalkError::ServerReported { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxtalkError>;
