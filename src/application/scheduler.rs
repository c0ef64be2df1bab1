//! Scheduler / work queue.
//!
//! A poll timer calls every Base plugin's periodic update hook once per
//! guild per tick; returned deferred actions go onto a shared FIFO queue
//! that a single consumer drains with a fixed spacing between executions.
//! The spacing exists solely to respect the external rate limit on the side
//! effects the actions perform.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::application::errors::HookError;
use crate::domain::entities::GuildContext;
use crate::infrastructure::database::Database;
use crate::plugins::api::{HostContext, QueuedAction};
use crate::plugins::registry::CapabilityRegistry;

/// Unbounded FIFO action queue: concurrent append from the poll tick's many
/// per-plugin producers, sequential removal by the single consumer. No
/// priority, cancellation, deduplication or backpressure.
#[derive(Default)]
pub struct ActionQueue {
    inner: Mutex<VecDeque<QueuedAction>>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, action: QueuedAction) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(action);
    }

    pub fn pop(&self) -> Option<QueuedAction> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between poll ticks.
    pub poll_interval: Duration,
    /// Minimum spacing between two executed actions.
    pub spacing: Duration,
    /// Consumer sleep when the queue is empty.
    pub idle_sleep: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            spacing: Duration::from_secs(1),
            idle_sleep: Duration::from_millis(100),
        }
    }
}

pub struct TaskQueueScheduler {
    database: Database,
    registry: Arc<CapabilityRegistry>,
    ctx: Arc<HostContext>,
    queue: Arc<ActionQueue>,
    config: SchedulerConfig,
}

impl TaskQueueScheduler {
    pub fn new(
        database: Database,
        registry: Arc<CapabilityRegistry>,
        ctx: Arc<HostContext>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            database,
            registry,
            ctx,
            queue: Arc::new(ActionQueue::new()),
            config,
        }
    }

    pub fn queue(&self) -> Arc<ActionQueue> {
        Arc::clone(&self.queue)
    }

    /// Spawn the poll timer and the consumer loop as two independent
    /// background tasks. Both run for the process lifetime.
    pub fn start(&self) -> (JoinHandle<()>, JoinHandle<()>) {
        let poll = {
            let database = self.database.clone();
            let registry = Arc::clone(&self.registry);
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let interval = self.config.poll_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    run_tick(&database, &registry, &ctx, &queue).await;
                }
            })
        };

        let consumer = {
            let queue = Arc::clone(&self.queue);
            let spacing = self.config.spacing;
            let idle_sleep = self.config.idle_sleep;
            tokio::spawn(async move {
                drain_queue(&queue, spacing, idle_sleep).await;
            })
        };

        info!("Action enqueue/dequeue tasks started");
        (poll, consumer)
    }
}

/// One poll tick: every guild with a persisted settings row, times every
/// Base plugin. A failing or panicking hook is logged with the plugin's
/// name and never halts the tick; `NotImplemented` is silent.
pub async fn run_tick(
    database: &Database,
    registry: &Arc<CapabilityRegistry>,
    ctx: &Arc<HostContext>,
    queue: &Arc<ActionQueue>,
) {
    let rows = database.select("SELECT guild_id, prefix FROM guildsettings", &[]);
    for pair in rows.chunks(2) {
        let guild_id = match pair.first().and_then(|id| id.parse::<u64>().ok()) {
            Some(id) if id != 0 => id,
            _ => continue,
        };
        let prefix = pair.get(1).cloned().unwrap_or_default();
        let guild = GuildContext::new(guild_id, prefix);

        for plugin in registry.get_all_base() {
            let name = plugin.name().to_string();
            // Each hook runs in its own task so an unwinding plugin is
            // isolated from the tick, surfacing as a JoinError instead.
            let hook = {
                let ctx = Arc::clone(ctx);
                let guild = guild.clone();
                tokio::spawn(async move { plugin.update(&ctx, &guild).await })
            };
            match hook.await {
                Ok(Ok(Some(action))) => {
                    info!("Got new work from {}: queued action {}", name, action.id);
                    queue.push(action);
                }
                Ok(Ok(None)) | Ok(Err(HookError::NotImplemented)) => {}
                Ok(Err(e)) => {
                    error!("An error occurred in {} update hook: {}", name, e);
                }
                Err(e) => {
                    error!("{} update hook panicked: {}", name, e);
                }
            }
        }
    }
}

/// The perpetually running consumer: pop the head, execute, wait out the
/// spacing interval. An empty queue is re-checked after a short sleep.
/// Actions run in their own task so a panicking action cannot take the
/// consumer down with it.
pub async fn drain_queue(queue: &ActionQueue, spacing: Duration, idle_sleep: Duration) {
    loop {
        match queue.pop() {
            Some(action) => {
                let waited = chrono::Utc::now() - action.enqueued_at;
                info!(
                    "Executing action {} from {} (queued {}ms)",
                    action.id,
                    action.plugin,
                    waited.num_milliseconds()
                );
                match tokio::spawn(action.task).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(
                            "An error occurred in returned action from {}: {}",
                            action.plugin, e
                        );
                    }
                    Err(e) => {
                        error!("Action {} from {} panicked: {}", action.id, action.plugin, e);
                    }
                }
                tokio::time::sleep(spacing).await;
            }
            None => {
                tokio::time::sleep(idle_sleep).await;
            }
        }
    }
}
