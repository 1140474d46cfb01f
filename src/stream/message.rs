//! Wire protocol records for the streaming speech service.
//!
//! Each event line carries a JSON object tagged by a `type` field. The raw
//! serde shape (`WireEvent`) is separated from the validated form
//! (`StreamMessage`) so id validation failures stay at one conversion
//! boundary. Audio payloads stay base64 here; the session controller decodes
//! them, where a failure can surface to the caller as a per-chunk warning.

use crate::error::{Result, VoxtalkError};
use serde::{Deserialize, Serialize};

/// Raw event record as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    /// Session-level metadata (voice, language, etc. — forwarded opaquely).
    Metadata {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        timestamp: f64,
    },
    /// Generated text for one sentence.
    Text {
        sentence_id: u64,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        timestamp: f64,
    },
    /// Synthesized audio for one sentence.
    Audio {
        sentence_id: u64,
        #[serde(default)]
        text: Option<String>,
        audio_data: String,
        /// Informational byte count; not trusted for framing.
        #[serde(default)]
        audio_length: Option<u64>,
        #[serde(default)]
        timestamp: f64,
    },
    /// A sentence's generation finished (text and audio both sent).
    SentenceComplete {
        sentence_id: u64,
        #[serde(default)]
        timestamp: f64,
    },
    /// The whole utterance finished generating.
    Complete {
        #[serde(default)]
        total_sentences: Option<u64>,
        #[serde(default)]
        timestamp: f64,
    },
    /// Server-side failure; fatal to the session.
    Error {
        error: String,
        #[serde(default)]
        timestamp: f64,
    },
}

/// Validated, decoded stream message.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    Metadata {
        text: Option<String>,
        timestamp: f64,
    },
    Text {
        sequence_id: u64,
        text: String,
        timestamp: f64,
    },
    Audio {
        sequence_id: u64,
        text: String,
        /// Base64 container payload (header + PCM), not yet decoded.
        audio_data: String,
        timestamp: f64,
    },
    SentenceComplete {
        sequence_id: u64,
        timestamp: f64,
    },
    Complete {
        total_sentences: Option<u64>,
        timestamp: f64,
    },
    Error {
        message: String,
        timestamp: f64,
    },
}

impl WireEvent {
    /// Validates this record into a `StreamMessage`.
    ///
    /// # Errors
    /// `ProtocolDecode` for a zero sequence id.
    pub fn into_message(self) -> Result<StreamMessage> {
        match self {
            WireEvent::Metadata { text, timestamp } => {
                Ok(StreamMessage::Metadata { text, timestamp })
            }
            WireEvent::Text {
                sentence_id,
                text,
                timestamp,
            } => {
                check_sequence_id(sentence_id)?;
                Ok(StreamMessage::Text {
                    sequence_id: sentence_id,
                    text: text.unwrap_or_default(),
                    timestamp,
                })
            }
            WireEvent::Audio {
                sentence_id,
                text,
                audio_data,
                audio_length: _,
                timestamp,
            } => {
                check_sequence_id(sentence_id)?;
                Ok(StreamMessage::Audio {
                    sequence_id: sentence_id,
                    text: text.unwrap_or_default(),
                    audio_data,
                    timestamp,
                })
            }
            WireEvent::SentenceComplete {
                sentence_id,
                timestamp,
            } => {
                check_sequence_id(sentence_id)?;
                Ok(StreamMessage::SentenceComplete {
                    sequence_id: sentence_id,
                    timestamp,
                })
            }
            WireEvent::Complete {
                total_sentences,
                timestamp,
            } => Ok(StreamMessage::Complete {
                total_sentences,
                timestamp,
            }),
            WireEvent::Error { error, timestamp } => Ok(StreamMessage::Error {
                message: error,
                timestamp,
            }),
        }
    }
}

fn check_sequence_id(id: u64) -> Result<()> {
    if id == 0 {
        return Err(VoxtalkError::ProtocolDecode {
            message: "sentence_id must be >= 1".to_string(),
        });
    }
    Ok(())
}
