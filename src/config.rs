//! Operator configuration
//!
//! Loaded from TOML. Durations are given in seconds, as floats.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE};
use crate::error::{Error, Result};

/// PCM format shared by the graph and the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
        }
    }
}

impl AudioFormat {
    /// Bytes per interleaved s16 frame
    pub fn bytes_per_frame(&self) -> usize {
        2 * self.channels as usize
    }
}

/// Configuration of one pipe operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipeConfig {
    /// Command line, run through `sh -c`
    pub process: String,
    /// Pre-roll before output is considered ready, in seconds
    pub buffer: f64,
    /// Backpressure ceiling on decoded audio, in seconds
    pub max: f64,
    /// Restart the process after a clean exit
    pub restart: bool,
    /// Restart the process after it exited with an error
    pub restart_on_error: bool,
    pub format: AudioFormat,
    /// Wait before retrying stdin when upstream had nothing to give
    pub idle_interval_ms: u64,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            process: String::new(),
            buffer: 1.0,
            max: 10.0,
            restart: true,
            restart_on_error: false,
            format: AudioFormat::default(),
            idle_interval_ms: 10,
        }
    }
}

impl PipeConfig {
    /// Config running `process` with default settings
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: PipeConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.process.trim().is_empty() {
            return Err(Error::Config("process must not be empty".into()));
        }
        if self.format.channels == 0 {
            return Err(Error::Config("format.channels must be positive".into()));
        }
        if self.format.sample_rate == 0 {
            return Err(Error::Config("format.sample_rate must be positive".into()));
        }
        for (name, value) in [("buffer", self.buffer), ("max", self.max)] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "{} must be a non-negative number of seconds, got {}",
                    name, value
                )));
            }
        }
        if self.max < self.buffer {
            return Err(Error::Config(format!(
                "max ({}) must not be lower than buffer ({})",
                self.max, self.buffer
            )));
        }
        Ok(())
    }

    pub fn buffer_duration(&self) -> Duration {
        Duration::from_secs_f64(self.buffer)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs_f64(self.max)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_toml() {
        let config = PipeConfig::from_toml(r#"process = "cat""#).unwrap();
        assert_eq!(config.process, "cat");
        assert!(config.restart);
        assert!(!config.restart_on_error);
        assert_eq!(config.format, AudioFormat::default());
        assert_eq!(config.max_duration(), Duration::from_secs(10));
    }

    #[test]
    fn test_full_toml() {
        let config = PipeConfig::from_toml(
            r#"
            process = "sox -t wav - -t wav - gain -3"
            buffer = 0.5
            max = 2.0
            restart = false
            restart_on_error = true
            idle_interval_ms = 5

            [format]
            sample_rate = 48000
            channels = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.buffer_duration(), Duration::from_millis(500));
        assert_eq!(config.format.sample_rate, 48000);
        assert_eq!(config.format.bytes_per_frame(), 2);
        assert!(config.restart_on_error);
        assert_eq!(config.idle_interval(), Duration::from_millis(5));
    }

    #[test]
    fn test_validation_errors() {
        assert!(PipeConfig::from_toml(r#"process = "  ""#).is_err());
        assert!(PipeConfig::from_toml("process = \"cat\"\nmax = -1.0").is_err());
        assert!(PipeConfig::from_toml("process = \"cat\"\nbuffer = 5.0\nmax = 1.0").is_err());
        assert!(
            PipeConfig::from_toml("process = \"cat\"\n[format]\nchannels = 0").is_err()
        );
    }

    #[test]
    fn test_unparseable_toml() {
        let err = PipeConfig::from_toml("process = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
