use async_trait::async_trait;

use crate::application::errors::BotError;

/// ChatClient trait - abstraction for the outbound side of the chat platform.
///
/// The gateway that produces events and the REST sink that performs side
/// effects live outside this crate; plugins and queued actions only ever see
/// this handle.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a message to a channel, returning the new message id
    async fn send_message(&self, channel_id: u64, text: &str) -> Result<u64, BotError>;

    /// Send a direct message to a user
    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<u64, BotError>;

    /// Add a reaction to an existing message
    async fn add_reaction(&self, channel_id: u64, message_id: u64, emoji: &str)
        -> Result<(), BotError>;

    /// Delete a message
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), BotError>;
}

/// Client that logs outbound traffic instead of hitting a platform.
///
/// Stands in for the real gateway when the host runs without one, and backs
/// the integration tests.
#[derive(Debug, Default)]
pub struct LoggingClient;

#[async_trait]
impl ChatClient for LoggingClient {
    async fn send_message(&self, channel_id: u64, text: &str) -> Result<u64, BotError> {
        tracing::info!("[outbound] channel {}: {}", channel_id, text);
        Ok(0)
    }

    async fn send_direct_message(&self, user_id: u64, text: &str) -> Result<u64, BotError> {
        tracing::info!("[outbound] dm {}: {}", user_id, text);
        Ok(0)
    }

    async fn add_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<(), BotError> {
        tracing::info!(
            "[outbound] react {} to {}/{}",
            emoji,
            channel_id,
            message_id
        );
        Ok(())
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<(), BotError> {
        tracing::info!("[outbound] delete {}/{}", channel_id, message_id);
        Ok(())
    }
}
