//! Configuration for thesis-match

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::MatchError;
use crate::ranking::RankOptions;
use crate::services::LifecyclePolicy;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("thesis-match")
}

/// Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the database and this config file
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// Default filters for recommendations; queries may override them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Hide supervisors with no available spot
    #[serde(default)]
    pub available_only: bool,

    /// Hide supervisors that already accepted or rejected the student
    #[serde(default = "default_true")]
    pub exclude_decided: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// One accepted supervisor per student; other pending requests are
    /// withdrawn on accept
    #[serde(default = "default_true")]
    pub withdraw_other_pending_on_accept: bool,

    /// Let an accepted request be withdrawn, returning the spot
    #[serde(default = "default_true")]
    pub allow_withdraw_accepted: bool,
}

fn default_http_port() -> u16 {
    8095
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            ranking: RankingConfig::default(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        let options = RankOptions::default();
        Self {
            available_only: options.available_only,
            exclude_decided: options.exclude_decided,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        let policy = LifecyclePolicy::default();
        Self {
            withdraw_other_pending_on_accept: policy.withdraw_other_pending_on_accept,
            allow_withdraw_accepted: policy.allow_withdraw_accepted,
        }
    }
}

impl From<RankingConfig> for RankOptions {
    fn from(config: RankingConfig) -> Self {
        RankOptions {
            available_only: config.available_only,
            exclude_decided: config.exclude_decided,
        }
    }
}

impl From<LifecycleConfig> for LifecyclePolicy {
    fn from(config: LifecycleConfig) -> Self {
        LifecyclePolicy {
            withdraw_other_pending_on_accept: config.withdraw_other_pending_on_accept,
            allow_withdraw_accepted: config.allow_withdraw_accepted,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MatchError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| MatchError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), MatchError> {
        let content = toml::to_string_pretty(self).map_err(|e| MatchError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join("match.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}
