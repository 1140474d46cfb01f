//! Command-line interface for voxtalk
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Streaming speech playback for conversational services
#[derive(Parser, Debug)]
#[command(
    name = "voxtalk",
    version,
    about = "Streaming speech playback for conversational services"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: session events, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Streaming endpoint URL (overrides config)
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Request timeout (default: 60s). Examples: 90s, 2m, 1m30s
    #[arg(long, short = 't', value_name = "DURATION", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Number of playback voices to keep warm
    #[arg(long, value_name = "N")]
    pub voices: Option<usize>,

    /// Maximum buffered out-of-order chunks before eviction
    #[arg(long, value_name = "N")]
    pub capacity: Option<usize>,

    /// Audio output device name (default: system default)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Write each received chunk as a WAV file into this directory
    #[arg(long, value_name = "DIR")]
    pub dump_dir: Option<PathBuf>,

    /// Read the JSON request body from a file instead of building one
    #[arg(long, value_name = "FILE")]
    pub body: Option<PathBuf>,

    /// Prompt text to send (read from stdin when omitted and piped)
    #[arg(value_name = "TEXT")]
    pub text: Vec<String>,
}

/// Parse a timeout string into a `Duration`.
///
/// Supports any format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`), and compound (`1m30s`).
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio output devices
    #[cfg(feature = "cpal-audio")]
    Devices,

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration inspection actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}
