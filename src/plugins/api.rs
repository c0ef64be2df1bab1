//! Plugin contract.
//!
//! Every plugin implements [`Plugin`] (the Base capability) and may opt into
//! the secondary capabilities by returning `Some` from the matching accessor.
//! Hooks receive the shared [`HostContext`] as an explicit argument on every
//! call; unimplemented hooks return [`HookError::NotImplemented`], which the
//! host treats as a silent no-op.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

use crate::application::errors::{HookError, HookResult, PluginError};
use crate::domain::entities::{
    ChannelEvent, CommandInvocation, CommandSpec, ComponentEvent, GuildContext, MessageEvent,
    ModalSpec, ReactionEvent, TableSpec, UserEvent, VoiceEvent,
};
use crate::domain::traits::ChatClient;
use crate::infrastructure::database::PluginStorage;

/// The fixed capability set a plugin may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Base,
    Commands,
    Messages,
    Reactions,
    Components,
    Channels,
    Users,
}

/// Shared runtime context handed to every hook call: the outbound client
/// handle and the guild set known at dispatch time.
pub struct HostContext {
    pub client: Arc<dyn ChatClient>,
    pub guilds: Vec<u64>,
}

impl HostContext {
    pub fn new(client: Arc<dyn ChatClient>, guilds: Vec<u64>) -> Self {
        Self { client, guilds }
    }
}

pub type ActionFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

/// A deferred unit of work returned by a periodic update hook, executed
/// later by the rate-limited queue consumer.
pub struct QueuedAction {
    pub id: Uuid,
    pub plugin: String,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub task: ActionFuture,
}

impl QueuedAction {
    pub fn new<F>(plugin: impl Into<String>, task: F) -> Self
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            plugin: plugin.into(),
            enqueued_at: chrono::Utc::now(),
            task: Box::pin(task),
        }
    }
}

/// Base capability. All loaded plugin instances implement this.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Display name; may be empty, in which case the host falls back to the
    /// module-derived name.
    fn name(&self) -> &str;

    /// Called once by the host when the effective name is decided.
    fn set_name(&mut self, name: String);

    fn description(&self) -> Option<&str> {
        None
    }

    /// Init hook, invoked with the plugin's storage facade before anything
    /// else happens to the instance. An error skips this plugin only.
    async fn init(&mut self, storage: PluginStorage) -> Result<(), PluginError>;

    /// Storage tables this plugin wants provisioned (name, column spec).
    fn table_specs(&self) -> Vec<TableSpec> {
        Vec::new()
    }

    /// Global commands this plugin exposes.
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }

    /// Modal definitions this plugin exposes.
    fn modals(&self) -> Vec<ModalSpec> {
        Vec::new()
    }

    /// Readiness hook, broadcast once after the full load pass completes.
    async fn on_ready(&self, _ctx: &HostContext) -> HookResult<()> {
        Err(HookError::NotImplemented)
    }

    /// Periodic update hook, called by the scheduler once per guild per
    /// tick. May return one deferred action for the work queue.
    async fn update(
        &self,
        _ctx: &HostContext,
        _guild: &GuildContext,
    ) -> HookResult<Option<QueuedAction>> {
        Err(HookError::NotImplemented)
    }

    fn command_hooks(&self) -> Option<&dyn CommandHooks> {
        None
    }

    fn message_hooks(&self) -> Option<&dyn MessageHooks> {
        None
    }

    fn reaction_hooks(&self) -> Option<&dyn ReactionHooks> {
        None
    }

    fn component_hooks(&self) -> Option<&dyn ComponentHooks> {
        None
    }

    fn channel_hooks(&self) -> Option<&dyn ChannelHooks> {
        None
    }

    fn user_hooks(&self) -> Option<&dyn UserHooks> {
        None
    }
}

#[async_trait]
pub trait CommandHooks: Send + Sync {
    async fn on_command(&self, ctx: &HostContext, invocation: &CommandInvocation)
        -> HookResult<()>;
}

#[async_trait]
pub trait MessageHooks: Send + Sync {
    async fn on_message(&self, ctx: &HostContext, event: &MessageEvent) -> HookResult<()>;
}

#[async_trait]
pub trait ReactionHooks: Send + Sync {
    async fn on_reaction_added(&self, _ctx: &HostContext, _event: &ReactionEvent) -> HookResult<()> {
        Err(HookError::NotImplemented)
    }

    async fn on_reaction_removed(
        &self,
        _ctx: &HostContext,
        _event: &ReactionEvent,
    ) -> HookResult<()> {
        Err(HookError::NotImplemented)
    }
}

#[async_trait]
pub trait ComponentHooks: Send + Sync {
    async fn on_component(&self, _ctx: &HostContext, _event: &ComponentEvent) -> HookResult<()> {
        Err(HookError::NotImplemented)
    }

    async fn on_modal_submit(&self, _ctx: &HostContext, _event: &ComponentEvent) -> HookResult<()> {
        Err(HookError::NotImplemented)
    }
}

#[async_trait]
pub trait ChannelHooks: Send + Sync {
    async fn on_channel_created(&self, _ctx: &HostContext, _event: &ChannelEvent) -> HookResult<()> {
        Err(HookError::NotImplemented)
    }

    async fn on_channel_destroyed(
        &self,
        _ctx: &HostContext,
        _event: &ChannelEvent,
    ) -> HookResult<()> {
        Err(HookError::NotImplemented)
    }
}

#[async_trait]
pub trait UserHooks: Send + Sync {
    async fn on_user_joined(&self, _ctx: &HostContext, _event: &UserEvent) -> HookResult<()> {
        Err(HookError::NotImplemented)
    }

    async fn on_voice_state_updated(
        &self,
        _ctx: &HostContext,
        _event: &VoiceEvent,
    ) -> HookResult<()> {
        Err(HookError::NotImplemented)
    }
}

/// The capabilities a concrete instance satisfies, derived from its
/// accessors. One check per capability, decided at compile time by which
/// accessors the plugin overrides.
pub fn capabilities_of(plugin: &dyn Plugin) -> Vec<Capability> {
    let mut caps = vec![Capability::Base];
    if plugin.command_hooks().is_some() {
        caps.push(Capability::Commands);
    }
    if plugin.message_hooks().is_some() {
        caps.push(Capability::Messages);
    }
    if plugin.reaction_hooks().is_some() {
        caps.push(Capability::Reactions);
    }
    if plugin.component_hooks().is_some() {
        caps.push(Capability::Components);
    }
    if plugin.channel_hooks().is_some() {
        caps.push(Capability::Channels);
    }
    if plugin.user_hooks().is_some() {
        caps.push(Capability::Users);
    }
    caps
}
