//! Runtime configuration for the BD driver
//!
//! [`DriverConfig`] holds the tunables of a pipeline: channel capacities,
//! worker chunking and the traffic drain window. Routing tables and word
//! layouts are *not* configuration; they come from the static chip table in
//! [`crate::layout`].
//!
//! Every section is `#[serde(default)]`, so a config file only needs the
//! values it changes:
//!
//! ```toml
//! [traffic]
//! drain_ms = 50
//! ```
//!
//! # Example
//!
//! ```ignore
//! use bd_driver::config::DriverConfig;
//!
//! let config = DriverConfig::load("driver.toml")?;
//! config.validate()?;
//! ```

use crate::encoder::WIRE_WORD_BYTES;
use crate::error::{DriverError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default traffic drain window
pub const DEFAULT_DRAIN_MS: u64 = 100;

// ==================== Driver Config ====================

/// Top-level runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub channels: ChannelConfig,

    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub traffic: TrafficConfig,
}

impl DriverConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DriverError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DriverError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        tracing::info!("Loaded driver config from {}", path.display());
        Ok(config)
    }

    /// Write this config as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DriverError::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let c = &self.channels;
        for (name, value) in [
            ("channels.encoder_input_capacity", c.encoder_input_capacity),
            ("channels.encoder_output_capacity", c.encoder_output_capacity),
            ("channels.decoder_input_capacity", c.decoder_input_capacity),
            ("channels.decoder_output_capacity", c.decoder_output_capacity),
            ("workers.chunk_size", self.workers.chunk_size),
        ] {
            if value == 0 {
                return Err(DriverError::Config(format!("{} must be non-zero", name)));
            }
        }
        if c.decoder_input_capacity < self.workers.chunk_size {
            return Err(DriverError::Config(format!(
                "channels.decoder_input_capacity ({}) is smaller than workers.chunk_size ({})",
                c.decoder_input_capacity, self.workers.chunk_size
            )));
        }
        if c.encoder_output_capacity < WIRE_WORD_BYTES {
            return Err(DriverError::Config(format!(
                "channels.encoder_output_capacity ({}) cannot hold one {}-byte wire word",
                c.encoder_output_capacity, WIRE_WORD_BYTES
            )));
        }
        if self.workers.poll_timeout_ms == 0 {
            return Err(DriverError::Config(
                "workers.poll_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ==================== Sections ====================

/// Channel capacities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Pending encoder requests
    pub encoder_input_capacity: usize,
    /// Encoded bytes waiting for the transport
    pub encoder_output_capacity: usize,
    /// Funnel transfers waiting for the decoder
    pub decoder_input_capacity: usize,
    /// Decoded records per funnel leaf
    pub decoder_output_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            encoder_input_capacity: 4096,
            encoder_output_capacity: 4096 * WIRE_WORD_BYTES,
            decoder_input_capacity: 4096,
            decoder_output_capacity: 4096,
        }
    }
}

/// Worker loop tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum items a worker handles per iteration
    pub chunk_size: usize,
    /// Longest a worker blocks before re-checking for shutdown
    pub poll_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            poll_timeout_ms: 10,
        }
    }
}

impl WorkerConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Traffic drain settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// How long in-flight traffic may keep arriving after traffic is disabled
    pub drain_ms: u64,
    /// Sleep between checks while waiting for traffic to drain
    pub poll_interval_ms: u64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            drain_ms: DEFAULT_DRAIN_MS,
            poll_interval_ms: 5,
        }
    }
}

impl TrafficConfig {
    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_valid() {
        let config = DriverConfig::default();
        config.validate().unwrap();
        assert_eq!(config.traffic.drain(), Duration::from_millis(DEFAULT_DRAIN_MS));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = DriverConfig::from_toml_str(
            r#"
            [traffic]
            drain_ms = 50

            [workers]
            chunk_size = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.traffic.drain_ms, 50);
        assert_eq!(config.traffic.poll_interval_ms, 5);
        assert_eq!(config.workers.chunk_size, 64);
        assert_eq!(config.channels, ChannelConfig::default());
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(DriverConfig::from_toml_str("").unwrap(), DriverConfig::default());
    }

    #[test]
    fn test_bad_toml() {
        let err = DriverConfig::from_toml_str("[traffic]\ndrain_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = DriverConfig::default();
        config.channels.decoder_output_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("decoder_output_capacity"));
    }

    #[test]
    fn test_validate_rejects_small_decoder_input() {
        let mut config = DriverConfig::default();
        config.workers.chunk_size = 100;
        config.channels.decoder_input_capacity = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_tiny_encoder_output() {
        let mut config = DriverConfig::default();
        config.channels.encoder_output_capacity = WIRE_WORD_BYTES - 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("driver.toml");

        let mut config = DriverConfig::default();
        config.traffic.drain_ms = 250;
        config.workers.poll_timeout_ms = 2;
        config.save(&path).unwrap();

        assert_eq!(DriverConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = DriverConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("driver.toml");
        std::fs::write(&path, "[workers]\nchunk_size = 0\n").unwrap();
        assert!(DriverConfig::load(&path).is_err());
    }
}
