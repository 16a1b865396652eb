//! Desktop audio configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AudioError, Result};

/// Resampling quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingQuality {
    /// Fast - Low CPU, good for older hardware
    /// 64 taps, 0.90 cutoff
    Fast,
    /// Balanced - Good quality with moderate CPU
    /// 128 taps, 0.95 cutoff
    Balanced,
    /// High - Excellent quality for critical listening (default)
    /// 256 taps, 0.99 cutoff
    #[default]
    High,
    /// Maximum - highest possible quality
    /// 512 taps, 0.995 cutoff
    Maximum,
}

impl ResamplingQuality {
    /// Sinc filter length
    pub fn sinc_len(&self) -> usize {
        match self {
            Self::Fast => 64,
            Self::Balanced => 128,
            Self::High => 256,
            Self::Maximum => 512,
        }
    }

    /// Frequency cutoff (relative to Nyquist)
    pub fn f_cutoff(&self) -> f32 {
        match self {
            Self::Fast => 0.90,
            Self::Balanced => 0.95,
            Self::High => 0.99,
            Self::Maximum => 0.995,
        }
    }

    /// Oversampling factor
    pub fn oversampling_factor(&self) -> usize {
        match self {
            Self::Fast => 128,
            Self::Balanced => 256,
            Self::High => 512,
            Self::Maximum => 1024,
        }
    }
}

/// Desktop context/transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopConfig {
    /// Interval between position ticks, in milliseconds
    pub position_tick_ms: u64,

    /// Decoded audio kept ahead of the output, in seconds
    pub buffer_seconds: usize,

    /// Sample rate conversion quality
    pub resampling: ResamplingQuality,

    /// Timeout for fetching HTTP streams, in seconds
    pub http_timeout_secs: u64,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            position_tick_ms: 250,
            buffer_seconds: 5,
            resampling: ResamplingQuality::default(),
            http_timeout_secs: 30,
        }
    }
}

impl DesktopConfig {
    /// Check that every value is usable
    pub fn validate(&self) -> Result<()> {
        if self.position_tick_ms == 0 {
            return Err(AudioError::Config("position_tick_ms must be positive".into()));
        }
        if self.buffer_seconds == 0 {
            return Err(AudioError::Config("buffer_seconds must be positive".into()));
        }
        if self.http_timeout_secs == 0 {
            return Err(AudioError::Config("http_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Position tick interval
    pub fn position_tick(&self) -> Duration {
        Duration::from_millis(self.position_tick_ms)
    }

    /// HTTP fetch timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = DesktopConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.position_tick(), Duration::from_millis(250));
        assert_eq!(config.resampling, ResamplingQuality::High);
    }

    #[test]
    fn zero_values_rejected() {
        let config = DesktopConfig {
            position_tick_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AudioError::Config(_))));

        let config = DesktopConfig {
            buffer_seconds: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn quality_presets_increase_filter_length() {
        let presets = [
            ResamplingQuality::Fast,
            ResamplingQuality::Balanced,
            ResamplingQuality::High,
            ResamplingQuality::Maximum,
        ];
        for pair in presets.windows(2) {
            assert!(pair[0].sinc_len() < pair[1].sinc_len());
            assert!(pair[0].f_cutoff() < pair[1].f_cutoff());
        }
    }
}
