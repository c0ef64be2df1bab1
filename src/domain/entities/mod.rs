//! Domain entities - platform events and plugin declarations

use serde::{Deserialize, Serialize};

/// A guild identifier plus the per-guild settings cached from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildContext {
    pub guild_id: u64,
    pub prefix: String,
}

impl GuildContext {
    pub fn new(guild_id: u64, prefix: impl Into<String>) -> Self {
        Self {
            guild_id,
            prefix: prefix.into(),
        }
    }
}

/// A global command a plugin wants published with the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    /// Platform-specific option payload, forwarded verbatim to the registrar.
    #[serde(default)]
    pub options: serde_json::Value,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            options: serde_json::Value::Null,
        }
    }
}

/// A modal definition a plugin exposes, keyed by its custom id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalSpec {
    pub custom_id: String,
    pub title: String,
}

/// A storage table a plugin declares; the table name is prefixed with the
/// plugin name when provisioned.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub name: String,
    pub columns: String,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, columns: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into(),
        }
    }
}

/// An incoming chat message.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    pub content: String,
}

/// A reaction added to or removed from a message.
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub user_id: u64,
    pub emoji: String,
    pub added: bool,
}

/// A component interaction (button, select) or modal submission.
#[derive(Debug, Clone)]
pub struct ComponentEvent {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub user_id: u64,
    pub custom_id: String,
    pub values: Vec<String>,
}

/// A global command invocation routed to its owning plugin.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub name: String,
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub user_id: u64,
    pub options: serde_json::Value,
}

/// A guild channel being created or destroyed.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    pub guild_id: u64,
    pub channel_id: u64,
    pub name: String,
    pub created: bool,
}

/// A user joining a guild.
#[derive(Debug, Clone)]
pub struct UserEvent {
    pub guild_id: u64,
    pub user_id: u64,
    pub username: String,
}

/// A voice state change; `channel_id` is `None` when the user disconnected.
#[derive(Debug, Clone)]
pub struct VoiceEvent {
    pub guild_id: u64,
    pub user_id: u64,
    pub channel_id: Option<u64>,
}
