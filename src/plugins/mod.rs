//! Plugin system for ember-bot
//!
//! Plugins are dynamically loaded shared libraries that extend the host.
//! Each module exports an entry function that registers its plugin
//! constructors; the host drives loading, identity/version reconciliation
//! and registration into the capability registry.

pub mod api;
pub mod config;
pub mod host;
pub mod loader;
pub mod registry;

pub use api::{Capability, HostContext, Plugin, QueuedAction};
pub use config::PluginConfig;
pub use host::{LoadSummary, PluginHost};
pub use loader::{ModuleLoader, ModuleRegistrar, MODULE_ENTRY_SYMBOL};
pub use registry::CapabilityRegistry;
