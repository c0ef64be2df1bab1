//! Event dispatch - fans platform events out to the capability registry.
//!
//! Every incoming event runs as its own fire-and-forget task, so multiple
//! dispatch invocations for the same plugin may be in flight at once;
//! plugins synchronize their own mutable state. A failing hook is logged
//! with the plugin's name and never stops the fan-out for the remaining
//! plugins.

use std::sync::Arc;
use tracing::error;

use crate::application::errors::{HookError, HookResult};
use crate::domain::entities::{
    ChannelEvent, CommandInvocation, ComponentEvent, MessageEvent, ReactionEvent, UserEvent,
    VoiceEvent,
};
use crate::infrastructure::database::Database;
use crate::plugins::api::{Capability, HostContext};
use crate::plugins::registry::CapabilityRegistry;

pub struct EventDispatcher {
    registry: Arc<CapabilityRegistry>,
    database: Database,
    ctx: Arc<HostContext>,
}

impl EventDispatcher {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        database: Database,
        ctx: Arc<HostContext>,
    ) -> Self {
        Self {
            registry,
            database,
            ctx,
        }
    }

    /// Deliver a command invocation to the plugin that owns the command
    /// name, per the ownership recorded at registration time.
    pub fn dispatch_command(&self, invocation: CommandInvocation) {
        let registry = Arc::clone(&self.registry);
        let database = self.database.clone();
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            let owner = command_owner(&database, &invocation.name);
            let Some(owner) = owner else {
                error!("No plugin owns command '{}'", invocation.name);
                return;
            };
            for plugin in registry.get(Capability::Commands) {
                if !plugin.name().eq_ignore_ascii_case(&owner) {
                    continue;
                }
                if let Some(hooks) = plugin.command_hooks() {
                    log_hook(plugin.name(), "on_command", hooks.on_command(&ctx, &invocation).await);
                }
            }
        });
    }

    pub fn dispatch_message(&self, event: MessageEvent) {
        let registry = Arc::clone(&self.registry);
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            for plugin in registry.get(Capability::Messages) {
                if let Some(hooks) = plugin.message_hooks() {
                    log_hook(plugin.name(), "on_message", hooks.on_message(&ctx, &event).await);
                }
            }
        });
    }

    /// Deliver a reaction to the plugin that owns the reacted-to message,
    /// per the ownership rows plugins write into `message_info`.
    pub fn dispatch_reaction(&self, event: ReactionEvent) {
        let registry = Arc::clone(&self.registry);
        let database = self.database.clone();
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            let Some(owner) = message_owner(&database, event.message_id) else {
                return;
            };
            for plugin in registry.get(Capability::Reactions) {
                if !plugin.name().eq_ignore_ascii_case(&owner) {
                    continue;
                }
                if let Some(hooks) = plugin.reaction_hooks() {
                    let result = if event.added {
                        hooks.on_reaction_added(&ctx, &event).await
                    } else {
                        hooks.on_reaction_removed(&ctx, &event).await
                    };
                    log_hook(plugin.name(), "on_reaction", result);
                }
            }
        });
    }

    pub fn dispatch_component(&self, event: ComponentEvent) {
        let registry = Arc::clone(&self.registry);
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            for plugin in registry.get(Capability::Components) {
                if let Some(hooks) = plugin.component_hooks() {
                    log_hook(
                        plugin.name(),
                        "on_component",
                        hooks.on_component(&ctx, &event).await,
                    );
                }
            }
        });
    }

    /// Modal submissions share the component capability.
    pub fn dispatch_modal_submit(&self, event: ComponentEvent) {
        let registry = Arc::clone(&self.registry);
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            for plugin in registry.get(Capability::Components) {
                if let Some(hooks) = plugin.component_hooks() {
                    log_hook(
                        plugin.name(),
                        "on_modal_submit",
                        hooks.on_modal_submit(&ctx, &event).await,
                    );
                }
            }
        });
    }

    pub fn dispatch_channel(&self, event: ChannelEvent) {
        let registry = Arc::clone(&self.registry);
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            for plugin in registry.get(Capability::Channels) {
                if let Some(hooks) = plugin.channel_hooks() {
                    let result = if event.created {
                        hooks.on_channel_created(&ctx, &event).await
                    } else {
                        hooks.on_channel_destroyed(&ctx, &event).await
                    };
                    log_hook(plugin.name(), "on_channel", result);
                }
            }
        });
    }

    pub fn dispatch_user_joined(&self, event: UserEvent) {
        let registry = Arc::clone(&self.registry);
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            for plugin in registry.get(Capability::Users) {
                if let Some(hooks) = plugin.user_hooks() {
                    log_hook(
                        plugin.name(),
                        "on_user_joined",
                        hooks.on_user_joined(&ctx, &event).await,
                    );
                }
            }
        });
    }

    pub fn dispatch_voice_state(&self, event: VoiceEvent) {
        let registry = Arc::clone(&self.registry);
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            for plugin in registry.get(Capability::Users) {
                if let Some(hooks) = plugin.user_hooks() {
                    log_hook(
                        plugin.name(),
                        "on_voice_state_updated",
                        hooks.on_voice_state_updated(&ctx, &event).await,
                    );
                }
            }
        });
    }
}

/// Resolve the plugin that claimed a command name at registration time.
pub fn command_owner(database: &Database, command_name: &str) -> Option<String> {
    database
        .select(
            "SELECT plugin_name FROM command_info WHERE command_name = :command",
            &[(":command", command_name)],
        )
        .into_iter()
        .next()
}

/// Resolve the plugin that recorded ownership of a message.
pub fn message_owner(database: &Database, message_id: u64) -> Option<String> {
    database
        .select(
            "SELECT plugin_name FROM message_info WHERE message_id = :message",
            &[(":message", &message_id.to_string())],
        )
        .into_iter()
        .next()
}

fn log_hook(plugin: &str, hook: &str, result: HookResult<()>) {
    match result {
        Ok(()) | Err(HookError::NotImplemented) => {}
        Err(e) => error!("A problem occurred in {} {} hook: {}", plugin, hook, e),
    }
}
