//! Player configuration

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tonearm_audio_desktop::DesktopConfig;
use tonearm_playback::EngineConfig;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TonearmConfig {
    pub engine: EngineConfig,
    pub desktop: DesktopConfig,
}

impl TonearmConfig {
    /// Load configuration from an optional TOML file and the environment
    ///
    /// Environment variables are prefixed with `TONEARM_` and use `__` between
    /// sections, e.g. `TONEARM_ENGINE__INITIAL_VOLUME=0.5`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path {
            settings = settings.add_source(config::File::from(path).required(true));
        } else if Path::new("tonearm.toml").exists() {
            settings = settings.add_source(config::File::with_name("tonearm.toml"));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("TONEARM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.engine.validate()?;
        self.desktop.validate()?;
        Ok(())
    }
}
