//! Plugin host - orchestrates the single startup load pass.
//!
//! For every instance a module yields: init, name fallback, identity
//! reconciliation, table provisioning, config/version reconciliation, the
//! one-time command and modal registration passes, and finally registration
//! into the capability registry. Every failure along the way is scoped to
//! the one instance that caused it.

use libloading::Library;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::errors::{BotError, HookError, PluginError};
use crate::domain::traits::CommandRegistrar;
use crate::infrastructure::database::Database;
use crate::plugins::api::{HostContext, Plugin};
use crate::plugins::config::PluginConfig;
use crate::plugins::loader::{ModuleLoader, ModuleRegistrar};
use crate::plugins::registry::CapabilityRegistry;

/// How a plugin's identity compares to the metadata store.
#[derive(Debug, PartialEq, Eq)]
enum IdentityStatus {
    NotExists,
    Mismatch,
    Ok,
}

/// Outcome of one `initialize` pass.
#[derive(Debug, Default)]
pub struct LoadSummary {
    pub plugins_loaded: usize,
    pub plugins_skipped: usize,
    pub load_failures: usize,
    pub instantiation_failures: usize,
}

pub struct PluginHost {
    database: Database,
    registry: Arc<CapabilityRegistry>,
    registrar: Arc<dyn CommandRegistrar>,
    plugin_dir: PathBuf,
    rebuild_commands: bool,
    // Keeps every loaded module alive for the process lifetime; instances
    // in the registry borrow code from these libraries.
    libraries: Vec<Library>,
}

impl PluginHost {
    pub fn new(
        database: Database,
        registry: Arc<CapabilityRegistry>,
        registrar: Arc<dyn CommandRegistrar>,
        plugin_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            database,
            registry,
            registrar,
            plugin_dir: plugin_dir.into(),
            rebuild_commands: false,
            libraries: Vec::new(),
        }
    }

    /// Force the one-time command pass to run again even when the persisted
    /// config says commands were already created.
    pub fn with_rebuild_commands(mut self, rebuild: bool) -> Self {
        self.rebuild_commands = rebuild;
        self
    }

    pub fn registry(&self) -> Arc<CapabilityRegistry> {
        Arc::clone(&self.registry)
    }

    /// Scan the plugin directory once and drive the load pass for every
    /// instance every module yields.
    pub async fn initialize(&mut self) -> Result<LoadSummary, BotError> {
        info!("Loading plugins from {}", self.plugin_dir.display());

        let loader = ModuleLoader::new(&self.plugin_dir);
        let report = loader.scan();

        let mut summary = LoadSummary {
            load_failures: report.load_failures,
            instantiation_failures: report.instantiation_failures,
            ..LoadSummary::default()
        };

        for module in report.modules {
            for plugin in module.instances {
                match self
                    .load_instance(plugin, &module.name, &module.version)
                    .await
                {
                    Ok(name) => {
                        summary.plugins_loaded += 1;
                        info!("Loaded plugin: {}, version: {}", name, module.version);
                    }
                    Err(e) => {
                        summary.plugins_skipped += 1;
                        warn!("Skipping plugin from module '{}': {}", module.name, e);
                    }
                }
            }
            self.libraries.push(module.library);
        }

        Ok(summary)
    }

    /// Load a module registered in-process, e.g. a statically linked plugin
    /// table. Runs the same per-instance pipeline as a scanned module.
    pub async fn load_registered_module(
        &mut self,
        module_name: &str,
        registrar: ModuleRegistrar,
    ) -> LoadSummary {
        let version = registrar.version().to_string();
        let (instances, failures) = registrar.instantiate(module_name);

        let mut summary = LoadSummary {
            instantiation_failures: failures,
            ..LoadSummary::default()
        };
        for plugin in instances {
            match self.load_instance(plugin, module_name, &version).await {
                Ok(name) => {
                    summary.plugins_loaded += 1;
                    info!("Loaded plugin: {}, version: {}", name, version);
                }
                Err(e) => {
                    summary.plugins_skipped += 1;
                    warn!("Skipping plugin from module '{}': {}", module_name, e);
                }
            }
        }
        summary
    }

    async fn load_instance(
        &self,
        mut plugin: Box<dyn Plugin>,
        module_name: &str,
        module_version: &str,
    ) -> Result<String, PluginError> {
        // The effective name is the declared one, falling back to the
        // module-derived name; the storage facade is keyed by it.
        let name = if plugin.name().is_empty() {
            module_name.to_string()
        } else {
            plugin.name().to_string()
        };

        // An erroring init skips only this plugin.
        plugin
            .init(self.database.for_plugin(&name))
            .await
            .map_err(|e| PluginError::Init(format!("{}: {}", name, e)))?;

        if plugin.name().is_empty() {
            plugin.set_name(name.clone());
        }

        match self.check_identity(&name, module_name) {
            IdentityStatus::NotExists => self.save_identity(module_name, &name),
            IdentityStatus::Mismatch => self.update_identity(module_name, &name),
            IdentityStatus::Ok => {}
        }

        self.provision_tables(plugin.as_ref(), &name);

        let mut config = match PluginConfig::load(&self.plugin_dir, module_name)? {
            Some(mut stored) => {
                if stored.reconcile_version(module_version) {
                    info!("{} version mismatch, updating config file.", name);
                    stored.save(&self.plugin_dir, module_name)?;
                }
                stored
            }
            None => {
                let fresh = PluginConfig::new(&name, module_version);
                fresh.save(&self.plugin_dir, module_name)?;
                fresh
            }
        };

        if !config.global_commands_created || self.rebuild_commands {
            self.register_commands(plugin.as_ref(), &name, module_name)
                .await;
            config.global_commands_created = true;
            config.save(&self.plugin_dir, module_name)?;
        }

        if !config.modals_created {
            let modals = plugin.modals();
            if !modals.is_empty() {
                for modal in &modals {
                    self.database.insert(
                        "INSERT INTO modal_info (modal_name, plugin_name, module_name) \
                         VALUES (:modal, :plugin, :module)",
                        &[
                            (":modal", &modal.custom_id),
                            (":plugin", &name),
                            (":module", module_name),
                        ],
                    );
                }
                config.modals_created = true;
                config.save(&self.plugin_dir, module_name)?;
            }
        }

        self.registry.register(Arc::from(plugin));
        Ok(name)
    }

    /// True when the command name is already claimed by a *different*
    /// plugin. The empty name is never claimable.
    pub fn check_command_conflict(&self, plugin_name: &str, command_name: &str) -> bool {
        if command_name.is_empty() {
            return true;
        }
        let rows = self.database.select(
            "SELECT plugin_name FROM command_info WHERE command_name = :command",
            &[(":command", command_name)],
        );
        match rows.first() {
            None => false,
            Some(owner) => owner != plugin_name,
        }
    }

    async fn register_commands(&self, plugin: &dyn Plugin, name: &str, module_name: &str) {
        for command in plugin.commands() {
            if self.check_command_conflict(name, &command.name) {
                warn!(
                    "Command '{}' already claimed, skipping registration for plugin '{}'",
                    command.name, name
                );
                continue;
            }
            self.database.insert(
                "INSERT OR REPLACE INTO command_info (command_name, plugin_name, module_name) \
                 VALUES (:command, :plugin, :module)",
                &[
                    (":command", &command.name),
                    (":plugin", name),
                    (":module", module_name),
                ],
            );
            if let Err(e) = self.registrar.publish_global(&command).await {
                warn!(
                    "Failed to publish global command '{}' for '{}': {}",
                    command.name, name, e
                );
            }
        }
    }

    fn check_identity(&self, plugin_name: &str, module_name: &str) -> IdentityStatus {
        if plugin_name.is_empty() {
            return IdentityStatus::NotExists;
        }
        let rows = self.database.select(
            "SELECT plugin_name FROM plugin_properties WHERE module_name = :module",
            &[(":module", module_name)],
        );
        if rows.is_empty() {
            IdentityStatus::NotExists
        } else if rows.iter().any(|stored| stored == plugin_name) {
            IdentityStatus::Ok
        } else {
            IdentityStatus::Mismatch
        }
    }

    fn save_identity(&self, module_name: &str, plugin_name: &str) {
        let inserted = self.database.insert(
            "INSERT INTO plugin_properties (module_name, plugin_name) VALUES (:module, :plugin)",
            &[(":module", module_name), (":plugin", plugin_name)],
        );
        info!(
            "Saved identity for {} to database: {}",
            plugin_name,
            if inserted == 0 { "no" } else { "yes" }
        );
    }

    fn update_identity(&self, module_name: &str, plugin_name: &str) {
        self.database.update(
            "UPDATE plugin_properties SET plugin_name = :plugin WHERE module_name = :module",
            &[(":plugin", plugin_name), (":module", module_name)],
        );
    }

    fn provision_tables(&self, plugin: &dyn Plugin, name: &str) {
        // Best effort; a plugin declaring no tables is skipped silently.
        for table in plugin.table_specs() {
            if let Err(e) = self
                .database
                .create_plugin_table(name, &table.name, &table.columns)
            {
                warn!("Failed to provision table '{}' for '{}': {}", table.name, name, e);
            }
        }
    }

    /// Broadcast readiness with the shared context to every Base plugin.
    /// Called exactly once, after load and one-time command registration
    /// complete, since guild membership is not final earlier in startup.
    pub async fn broadcast_ready(&self, ctx: &HostContext) {
        for plugin in self.registry.get_all_base() {
            match plugin.on_ready(ctx).await {
                Ok(()) | Err(HookError::NotImplemented) => {}
                Err(e) => {
                    warn!("A problem occurred in '{}' on_ready hook: {}", plugin.name(), e);
                }
            }
        }
    }

    /// Insert the default settings row for a newly joined guild. The
    /// scheduler only polls guilds that have one.
    pub fn ensure_guild_settings(&self, guild_id: u64, default_prefix: &str) {
        let existing = self.database.select(
            "SELECT guild_id FROM guildsettings WHERE guild_id = :guild",
            &[(":guild", &guild_id.to_string())],
        );
        if existing.is_empty() {
            self.database.insert(
                "INSERT INTO guildsettings (guild_id, prefix) VALUES (:guild, :prefix)",
                &[(":guild", &guild_id.to_string()), (":prefix", default_prefix)],
            );
        }
    }
}
