//! Player configuration, loaded from a TOML file.
//!
//! Every field has a default, so an empty file is a valid configuration.
//! Out-of-range values are clamped with a warning rather than rejected.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audio::device::OutputBackend;
use crate::audio::mixer::DEFAULT_BUFFER_SIZE;
use crate::clock::MAX_RATE;
use crate::decode::read_ahead::DEFAULT_CAPACITY;

/// Largest number of read-ahead lenses per sequence
pub const MAX_LENSES: usize = 9;

/// Lens count used when none is configured
pub const DEFAULT_LENSES: usize = 3;

/// Error type for loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Tunables for the playback workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Read-ahead lenses for plain sequences
    pub lenses: usize,

    /// Frames each lens buffers ahead
    pub lens_capacity: usize,

    /// Mixer buffer size in bytes
    pub buffer_size: usize,

    /// Audio output
    pub output: OutputBackend,

    /// Clock rate override; the sequence rate is used when unset
    pub rate: Option<u32>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            lenses: DEFAULT_LENSES,
            lens_capacity: DEFAULT_CAPACITY,
            buffer_size: DEFAULT_BUFFER_SIZE,
            output: OutputBackend::default(),
            rate: None,
        }
    }
}

impl PlayerConfig {
    /// Read and normalize a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: PlayerConfig = toml::from_str(text)?;
        Ok(config.normalize())
    }

    /// Clamp every field into its valid range
    pub fn normalize(mut self) -> Self {
        if self.lenses == 0 || self.lenses > MAX_LENSES {
            let clamped = self.lenses.clamp(1, MAX_LENSES);
            warn!(lenses = self.lenses, clamped, "Lens count out of range");
            self.lenses = clamped;
        }
        if self.lens_capacity == 0 {
            warn!("Lens capacity must be positive, using default");
            self.lens_capacity = DEFAULT_CAPACITY;
        }
        let aligned = self.buffer_size - self.buffer_size % 48;
        if aligned == 0 {
            warn!(buffer_size = self.buffer_size, "Buffer size too small, using default");
            self.buffer_size = DEFAULT_BUFFER_SIZE;
        } else if aligned != self.buffer_size {
            warn!(buffer_size = self.buffer_size, aligned, "Buffer size not a multiple of 48");
            self.buffer_size = aligned;
        }
        if let Some(rate) = self.rate {
            if rate == 0 || rate > MAX_RATE {
                warn!(rate, "Clock rate override out of range, ignoring");
                self.rate = None;
            }
        }
        self
    }

    /// Clock rate for a sequence playing at `sequence_rate`
    pub fn rate_for(&self, sequence_rate: u32) -> u32 {
        self.rate.unwrap_or(sequence_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(PlayerConfig::from_toml("").unwrap(), PlayerConfig::default());
    }

    #[test]
    fn test_parse_fields() {
        let config = PlayerConfig::from_toml(
            "lenses = 5\nlens_capacity = 8\nbuffer_size = 9600\noutput = \"null\"\nrate = 30\n",
        )
        .unwrap();
        assert_eq!(config.lenses, 5);
        assert_eq!(config.lens_capacity, 8);
        assert_eq!(config.buffer_size, 9600);
        assert_eq!(config.output, OutputBackend::Null);
        assert_eq!(config.rate_for(24), 30);
    }

    #[test]
    fn test_normalize_clamps() {
        let config = PlayerConfig {
            lenses: 12,
            lens_capacity: 0,
            buffer_size: 100,
            output: OutputBackend::Null,
            rate: Some(5000),
        }
        .normalize();
        assert_eq!(config.lenses, MAX_LENSES);
        assert_eq!(config.lens_capacity, DEFAULT_CAPACITY);
        assert_eq!(config.buffer_size, 96);
        assert_eq!(config.rate, None);
        assert_eq!(config.rate_for(24), 24);

        let config = PlayerConfig {
            lenses: 0,
            buffer_size: 10,
            ..PlayerConfig::default()
        }
        .normalize();
        assert_eq!(config.lenses, 1);
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            PlayerConfig::from_toml("lenses = \"three\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            PlayerConfig::load("/nonexistent/frameplay.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
