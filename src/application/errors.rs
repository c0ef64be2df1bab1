//! Application layer errors

use thiserror::Error;

/// General host errors
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Plugin lifecycle errors, each scoped to a single file, type or plugin
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Load error: {0}")]
    Load(String),

    #[error("Instantiation error: {0}")]
    Instantiation(String),

    #[error("Init error: {0}")]
    Init(String),

    #[error("Command '{command}' already claimed by '{claimed_by}'")]
    Conflict { command: String, claimed_by: String },

    #[error("Plugin config error: {0}")]
    Config(String),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Query(err.to_string())
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Outcome of a single plugin hook invocation.
///
/// `NotImplemented` is a silent no-op for the caller, never logged as an
/// error. Anything else is logged with the owning plugin's name and the
/// dispatch continues with the remaining plugins.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("not implemented")]
    NotImplemented,

    #[error("{0}")]
    Failed(String),
}

pub type HookResult<T> = Result<T, HookError>;
