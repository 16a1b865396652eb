//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::{PlaybackError, Result};

/// Configuration for [`PlaybackEngine`](crate::PlaybackEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial output volume (0.0-1.0, default: 0.7)
    pub initial_volume: f32,

    /// Analysis FFT size, power of two between 32 and 32768 (default: 2048)
    pub fft_size: usize,

    /// Spectrum smoothing between analysis frames (0.0-1.0, default: 0.8)
    pub smoothing: f32,

    /// Floor of the reported spectrum in dB (default: -100)
    pub min_decibels: f32,

    /// Ceiling of the reported spectrum in dB (default: -30)
    pub max_decibels: f32,

    /// Buffered notifications per subscriber before it starts lagging (default: 64)
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_volume: 0.7,
            fft_size: 2048,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            notification_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(PlaybackError::Config(format!(
                "initial_volume must be within [0, 1], got {}",
                self.initial_volume
            )));
        }

        if !self.fft_size.is_power_of_two() || !(32..=32768).contains(&self.fft_size) {
            return Err(PlaybackError::Config(format!(
                "fft_size must be a power of two in [32, 32768], got {}",
                self.fft_size
            )));
        }

        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(PlaybackError::Config(format!(
                "smoothing must be within [0, 1], got {}",
                self.smoothing
            )));
        }

        if self.min_decibels >= self.max_decibels {
            return Err(PlaybackError::Config(format!(
                "min_decibels ({}) must be below max_decibels ({})",
                self.min_decibels, self.max_decibels
            )));
        }

        if self.notification_capacity == 0 {
            return Err(PlaybackError::Config(
                "notification_capacity must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.initial_volume, 0.7);
        assert_eq!(config.fft_size, 2048);
        assert_eq!(config.smoothing, 0.8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_fft_size() {
        let config = EngineConfig {
            fft_size: 1000,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(PlaybackError::Config(_))));
    }

    #[test]
    fn rejects_out_of_range_volume() {
        let config = EngineConfig {
            initial_volume: 1.5,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_decibel_range() {
        let config = EngineConfig {
            min_decibels: -10.0,
            max_decibels: -30.0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"initial_volume": 0.25}"#).unwrap();
        assert_eq!(config.initial_volume, 0.25);
        assert_eq!(config.fft_size, 2048);
    }
}
