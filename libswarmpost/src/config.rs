//! Configuration management for Swarmpost

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::types::DelayConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub pacing: DelayConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Durable account registry (JSON)
    pub accounts_file: String,
    /// Durable failure log (JSON)
    pub failures_file: String,
    /// Directory holding one `<group>.json` content list per group
    pub content_dir: String,
}

/// How a worker picks the next content unit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Head of the pending queue, restarting the cycle when it drains
    #[default]
    Sequential,
    /// Uniform random draw from the group on every iteration
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub selection: SelectionMode,
    /// Times a transiently-failed unit is re-enqueued before being dropped for the cycle
    pub max_requeues: u32,
    /// Randomized worker startup stagger, seconds
    pub stagger_min_secs: u64,
    pub stagger_max_secs: u64,
    /// Recovery delay after a transient failure, minutes (scaled by backoff)
    pub recovery_min_minutes: u32,
    pub recovery_max_minutes: u32,
    /// Wait between the first and second verification reads, seconds
    pub verify_retry_wait_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            selection: SelectionMode::Sequential,
            max_requeues: 3,
            stagger_min_secs: 13,
            stagger_max_secs: 47,
            recovery_min_minutes: 11,
            recovery_max_minutes: 21,
            verify_retry_wait_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            storage: StorageConfig {
                accounts_file: "~/.local/share/swarmpost/accounts.json".to_string(),
                failures_file: "~/.local/share/swarmpost/failures.json".to_string(),
                content_dir: "~/.local/share/swarmpost/groups".to_string(),
            },
            pacing: DelayConfig::default(),
            runner: RunnerConfig::default(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SWARMPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("swarmpost").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default_config();
        assert!(config.storage.accounts_file.ends_with("accounts.json"));
        assert_eq!(config.runner.max_requeues, 3);
        assert_eq!(config.runner.selection, SelectionMode::Sequential);
        assert_eq!(config.pacing.min_minutes, 17);
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[storage]
accounts_file = "accounts.json"
failures_file = "failures.json"
content_dir = "groups"

[pacing]
min_minutes = 5
max_minutes = 9
jitter_minutes = 2
use_individual_delays = true

[runner]
selection = "random"
max_requeues = 1
stagger_min_secs = 0
stagger_max_secs = 0
recovery_min_minutes = 1
recovery_max_minutes = 2
verify_retry_wait_secs = 0
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.pacing.min_minutes, 5);
        assert!(config.pacing.use_individual_delays);
        assert_eq!(config.runner.selection, SelectionMode::Random);
        assert_eq!(config.runner.max_requeues, 1);
    }

    #[test]
    fn test_load_missing_sections_use_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[storage]
accounts_file = "a.json"
failures_file = "f.json"
content_dir = "groups"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.pacing, DelayConfig::default());
        assert_eq!(config.runner.stagger_max_secs, 47);
    }

    #[test]
    fn test_load_from_missing_path_fails() {
        let path = PathBuf::from("/nonexistent/swarmpost/config.toml");
        assert!(Config::load_from_path(&path).is_err());
    }
}
