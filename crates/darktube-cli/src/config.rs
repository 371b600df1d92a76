//! Configuration file loading

use anyhow::Context;
use darktube_core::{ApiConfig, PlayerConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings read from `--config`; every field falls back to its default
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub player: PlayerConfig,
    pub api: ApiConfig,
}

impl CliConfig {
    /// Read the configuration file, or use defaults when none is given
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config
            .player
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        tracing::debug!(path = %path.display(), base_url = %config.api.base_url, "Loaded configuration");
        Ok(config)
    }
}
