//! Per-plugin persisted config.
//!
//! One YAML file per module next to the module itself, tracking the version
//! the plugin last ran as and the one-time registration flags. Created on
//! first load, mutated on version drift, never silently discarded.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::application::errors::PluginError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PluginConfig {
    pub plugin_name: String,
    pub version: String,
    pub global_commands_created: bool,
    pub modals_created: bool,
}

impl PluginConfig {
    pub fn new(plugin_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            version: version.into(),
            global_commands_created: false,
            modals_created: false,
        }
    }

    pub fn path_for(dir: &Path, module_name: &str) -> PathBuf {
        dir.join(format!("{}_config.yaml", module_name))
    }

    /// Load the stored config for a module, `None` when it does not exist.
    pub fn load(dir: &Path, module_name: &str) -> Result<Option<Self>, PluginError> {
        let path = Self::path_for(dir, module_name);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| PluginError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = serde_yaml::from_str(&content)
            .map_err(|e| PluginError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        Ok(Some(config))
    }

    pub fn save(&self, dir: &Path, module_name: &str) -> Result<(), PluginError> {
        let path = Self::path_for(dir, module_name);
        let content = serde_yaml::to_string(self)
            .map_err(|e| PluginError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&path, content)
            .map_err(|e| PluginError::Config(format!("Failed to write {}: {}", path.display(), e)))
    }

    /// Reconcile the stored version against the module's current version.
    ///
    /// On drift the one-time registration flags are invalidated and the
    /// stored version overwritten; other fields are untouched. Returns
    /// whether anything changed.
    pub fn reconcile_version(&mut self, module_version: &str) -> bool {
        if self.version == module_version {
            return false;
        }
        self.global_commands_created = false;
        self.modals_created = false;
        self.version = module_version.to_string();
        true
    }
}
