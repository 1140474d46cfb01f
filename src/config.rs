use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub buffer: BufferConfig,
    pub playback: PlaybackConfig,
}

/// Event stream transport configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Endpoint URL for the streaming speech service.
    pub endpoint: Option<String>,
    /// Overall request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Marker prefix for event lines.
    pub line_marker: String,
}

/// Reassembly buffer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BufferConfig {
    /// Maximum buffered out-of-order chunks before eviction.
    pub capacity: usize,
    /// How long to wait for a missing sequence id before skipping it (ms).
    pub missing_chunk_wait_ms: u64,
}

/// Playback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Number of playback voices in the pool.
    pub voices: usize,
    /// Output device name (None = system default).
    pub device: Option<String>,
    /// If set, every decoded chunk is also written here as a WAV file.
    pub dump_dir: Option<PathBuf>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            line_marker: defaults::LINE_MARKER.to_string(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::BUFFER_CAPACITY,
            missing_chunk_wait_ms: defaults::MISSING_CHUNK_WAIT_MS,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            voices: defaults::VOICE_POOL_SIZE,
            device: None,
            dump_dir: None,
        }
    }
}

impl StreamConfig {
    /// The request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl BufferConfig {
    /// The missing-chunk wait as a `Duration`.
    pub fn missing_chunk_wait(&self) -> Duration {
        Duration::from_millis(self.missing_chunk_wait_ms)
    }
}

impl Config {
    /// Default configuration file path (~/.config/voxtalk/config.toml).
    #[cfg(feature = "cli")]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxtalk")
            .join("config.toml")
    }

    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Self::default()
                } else {
                    tracing::warn!("ignoring invalid config at {}: {e}", path.display());
                    Self::default()
                }
            }
        }
    }

    /// Reject configurations that cannot work at runtime.
    fn validate(&self) -> anyhow::Result<()> {
        if self.buffer.capacity == 0 {
            anyhow::bail!("buffer.capacity must be at least 1");
        }
        if self.playback.voices == 0 {
            anyhow::bail!("playback.voices must be at least 1");
        }
        if self.stream.line_marker.is_empty() {
            anyhow::bail!("stream.line_marker must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.buffer.capacity, 10);
        assert_eq!(config.playback.voices, 3);
        assert_eq!(config.stream.request_timeout_secs, 60);
        assert_eq!(config.stream.line_marker, "data: ");
        assert!(config.stream.endpoint.is_none());
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let mut file = NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            "[stream]\nendpoint = \"http://localhost:8100/chat\"\n\n[buffer]\ncapacity = 4"
        )
        .expect("write config");

        let config = Config::load(file.path()).expect("load config");
        assert_eq!(
            config.stream.endpoint.as_deref(),
            Some("http://localhost:8100/chat")
        );
        assert_eq!(config.buffer.capacity, 4);
        // Untouched sections fall back to defaults
        assert_eq!(config.playback.voices, 3);
        assert_eq!(config.buffer.missing_chunk_wait_ms, 2000);
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let mut file = NamedTempFile::new().expect("create temp file");
        writeln!(file, "[stream\nbroken").expect("write config");
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_rejects_zero_capacity() {
        let mut file = NamedTempFile::new().expect("create temp file");
        writeln!(file, "[buffer]\ncapacity = 0").expect("write config");
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/voxtalk.toml"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_duration_helpers() {
        let config = Config::default();
        assert_eq!(config.stream.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.buffer.missing_chunk_wait(), Duration::from_millis(2000));
    }
}
