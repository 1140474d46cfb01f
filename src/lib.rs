//! voxtalk - Streaming voice playback for conversational AI services
//!
//! Connects to a streaming speech endpoint, reassembles out-of-order audio
//! chunks, and plays them back gaplessly in sequence order.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
#[cfg(feature = "cli")]
pub mod output;
pub mod stream;

// Core traits (decode → buffer → play)
pub use audio::voice::{MockVoice, VoicePool, VoiceSink};

// Session pipeline
pub use stream::controller::{SessionController, SessionHandle, SessionState};
pub use stream::events::SessionEvent;

// Error handling
pub use error::{Result, VoxtalkError};

// Config
pub use config::Config;
