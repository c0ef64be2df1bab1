use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ember_bot::application::scheduler::{SchedulerConfig, TaskQueueScheduler};
use ember_bot::domain::traits::{LoggingClient, LoggingRegistrar};
use ember_bot::infrastructure::config::HostConfig;
use ember_bot::infrastructure::database::Database;
use ember_bot::plugins::{CapabilityRegistry, HostContext, PluginHost};

#[derive(Parser)]
#[command(name = "ember-bot")]
#[command(about = "Extensible chat bot host with dynamically loaded plugins", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Plugin directory (overrides config)
    #[arg(short, long)]
    plugin_dir: Option<PathBuf>,

    /// Re-run the one-time global command registration pass
    #[arg(long)]
    rebuild_commands: bool,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match HostConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            HostConfig::default()
        }
    };

    tracing::info!("Starting {}: {}", config.bot.name, config.bot.activity);

    let database = Database::open(&config.storage.database_path);
    if let Err(e) = database.initialize() {
        // The only failure fatal to the host process.
        tracing::error!("Failed to initialize database: {}", e);
        std::process::exit(1);
    }

    let plugin_dir = cli
        .plugin_dir
        .unwrap_or_else(|| config.plugins.directory.clone());

    let registry = Arc::new(CapabilityRegistry::new());
    let registrar = Arc::new(LoggingRegistrar);

    let mut host = PluginHost::new(
        database.clone(),
        Arc::clone(&registry),
        registrar,
        plugin_dir,
    )
    .with_rebuild_commands(cli.rebuild_commands);

    let summary = match host.initialize().await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Plugin load pass failed: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "Plugins loaded: {} ({} skipped, {} module load failures, {} type failures)",
        summary.plugins_loaded,
        summary.plugins_skipped,
        summary.load_failures,
        summary.instantiation_failures
    );

    // The gateway that would populate the guild set lives outside this
    // crate; until one is wired in, the known guilds are the persisted ones.
    let guilds: Vec<u64> = database
        .select("SELECT guild_id FROM guildsettings", &[])
        .into_iter()
        .filter_map(|id| id.parse().ok())
        .collect();

    let client = Arc::new(LoggingClient);
    let ctx = Arc::new(HostContext::new(client, guilds));

    host.broadcast_ready(&ctx).await;

    // The EventDispatcher is constructed by whatever gateway adapter feeds
    // events in; with none wired, only the scheduler runs.
    let scheduler = TaskQueueScheduler::new(
        database,
        registry,
        ctx,
        SchedulerConfig {
            poll_interval: Duration::from_millis(config.scheduler.poll_interval_ms),
            spacing: Duration::from_millis(config.scheduler.queue_spacing_ms),
            idle_sleep: Duration::from_millis(config.scheduler.idle_sleep_ms),
        },
    );
    let (_poll, _consumer) = scheduler.start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
