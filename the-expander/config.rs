use std::{
  path::Path,
  time::Duration,
};

use serde::Deserialize;
use the_lib::{
  cache::CacheConfig,
  candidate::MatcherConfig,
};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
  pub pipeline: PipelineConfig,
  pub matcher:  MatcherConfig,
  pub cache:    CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PipelineConfig {
  /// Quiet period before the caret position is persisted.
  pub track_debounce_ms:  u64,
  /// Quiet period before candidates are matched and resolved.
  pub detect_debounce_ms: u64,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      track_debounce_ms:  100,
      detect_debounce_ms: 500,
    }
  }
}

impl PipelineConfig {
  pub fn track_debounce(&self) -> Duration {
    Duration::from_millis(self.track_debounce_ms)
  }

  pub fn detect_debounce(&self) -> Duration {
    Duration::from_millis(self.detect_debounce_ms)
  }
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("{0}")]
  Load(String),
  #[error("bad config: {0}")]
  BadConfig(#[from] toml::de::Error),
}

impl Config {
  /// User and workspace configuration merged onto the built-in defaults.
  pub fn load_default() -> Result<Self, ConfigError> {
    let merged = the_expander_loader::config::user_config()
      .map_err(|err| ConfigError::Load(format!("{err:#}")))?;
    Ok(merged.try_into()?)
  }

  /// Defaults with `files` merged on top, in order.
  pub fn load(files: impl IntoIterator<Item = impl AsRef<Path>>) -> Result<Self, ConfigError> {
    let merged = the_expander_loader::config::merged_config(files)
      .map_err(|err| ConfigError::Load(format!("{err:#}")))?;
    Ok(merged.try_into()?)
  }
}
