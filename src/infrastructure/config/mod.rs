//! Host configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::application::errors::ConfigError;

/// Host configuration, loaded from a YAML file at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HostConfig {
    pub bot: BotSection,
    pub plugins: PluginsSection,
    pub storage: StorageSection,
    pub scheduler: SchedulerSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotSection {
    pub name: String,
    pub activity: String,
    pub default_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PluginsSection {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageSection {
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SchedulerSection {
    pub poll_interval_ms: u64,
    pub queue_spacing_ms: u64,
    pub idle_sleep_ms: u64,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            name: "ember-bot".to_string(),
            activity: "Watching the guilds".to_string(),
            default_prefix: "!".to_string(),
        }
    }
}

impl Default for PluginsSection {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("plugins"),
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("bot.db"),
        }
    }
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            queue_spacing_ms: 1000,
            idle_sleep_ms: 100,
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bot: BotSection::default(),
            plugins: PluginsSection::default(),
            storage: StorageSection::default(),
            scheduler: SchedulerSection::default(),
        }
    }
}

impl HostConfig {
    /// Load the config file, falling back to defaults when it is missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = HostConfig::load("does/not/exist.yaml").unwrap();
        assert_eq!(cfg.bot.default_prefix, "!");
        assert_eq!(cfg.scheduler.poll_interval_ms, 1000);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "bot:\n  name: testbot\n").unwrap();
        let cfg = HostConfig::load(&path).unwrap();
        assert_eq!(cfg.bot.name, "testbot");
        assert_eq!(cfg.scheduler.queue_spacing_ms, 1000);
    }
}
