use async_trait::async_trait;

use crate::application::errors::BotError;
use crate::domain::entities::CommandSpec;

/// CommandRegistrar trait - publishes global command definitions with the
/// external platform. Publication happens once per command per plugin
/// version; ownership bookkeeping stays in the host.
#[async_trait]
pub trait CommandRegistrar: Send + Sync {
    async fn publish_global(&self, command: &CommandSpec) -> Result<(), BotError>;
}

/// Registrar that only logs the definitions it is asked to publish.
#[derive(Debug, Default)]
pub struct LoggingRegistrar;

#[async_trait]
impl CommandRegistrar for LoggingRegistrar {
    async fn publish_global(&self, command: &CommandSpec) -> Result<(), BotError> {
        tracing::info!("[registrar] publishing global command /{}", command.name);
        Ok(())
    }
}
