//! Capability registry - indexes plugin instances by implemented capability.
//!
//! A typed multi-map from capability tag to an ordered instance list.
//! Mutated only during startup registration; steady-state dispatch only
//! reads it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::plugins::api::{capabilities_of, Capability, Plugin};

pub struct CapabilityRegistry {
    entries: RwLock<HashMap<Capability, Vec<Arc<dyn Plugin>>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Append the instance to every capability list it satisfies. Returns
    /// whether any capability matched.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> bool {
        let capabilities = capabilities_of(plugin.as_ref());
        if capabilities.is_empty() {
            return false;
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for capability in &capabilities {
            entries
                .entry(*capability)
                .or_default()
                .push(Arc::clone(&plugin));
        }
        info!(
            "Registered plugin '{}' with {} capability slot(s)",
            plugin.name(),
            capabilities.len()
        );
        true
    }

    /// Remove the named instance from the Base list only. Secondary lists
    /// are left alone; no current dispatch path requires their removal.
    pub fn unregister(&self, name: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(base) = entries.get_mut(&Capability::Base) {
            base.retain(|plugin| plugin.name() != name);
        }
    }

    /// Ordered instance snapshot for one capability.
    pub fn get(&self, capability: Capability) -> Vec<Arc<dyn Plugin>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&capability).cloned().unwrap_or_default()
    }

    /// All Base-capability instances, used for lifecycle-wide broadcasts.
    pub fn get_all_base(&self) -> Vec<Arc<dyn Plugin>> {
        self.get(Capability::Base)
    }

    pub fn len(&self) -> usize {
        self.get_all_base().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
