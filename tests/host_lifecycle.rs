//! Host lifecycle integration tests
//! Run with: cargo test --test host_lifecycle

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use ember_bot::application::dispatch::EventDispatcher;
use ember_bot::application::errors::{BotError, HookError, HookResult, PluginError};
use ember_bot::application::scheduler::{run_tick, ActionQueue};
use ember_bot::domain::entities::{CommandInvocation, CommandSpec, GuildContext};
use ember_bot::domain::traits::{CommandRegistrar, LoggingClient};
use ember_bot::infrastructure::database::{Database, PluginStorage};
use ember_bot::plugins::api::CommandHooks;
use ember_bot::plugins::{
    CapabilityRegistry, HostContext, ModuleRegistrar, Plugin, PluginConfig, PluginHost,
    QueuedAction,
};

static INIT: Once = Once::new();

fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}

/// Registrar that records every command it is asked to publish.
#[derive(Default)]
struct RecordingRegistrar {
    published: Mutex<Vec<String>>,
}

impl RecordingRegistrar {
    fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRegistrar for RecordingRegistrar {
    async fn publish_global(&self, command: &CommandSpec) -> Result<(), BotError> {
        self.published.lock().unwrap().push(command.name.clone());
        Ok(())
    }
}

#[derive(Default)]
struct TestPluginState {
    updates: AtomicUsize,
    handled_commands: Mutex<Vec<String>>,
}

struct TestPlugin {
    name: String,
    commands: Vec<CommandSpec>,
    fail_update: bool,
    panic_update: bool,
    state: Arc<TestPluginState>,
}

impl TestPlugin {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            commands: Vec::new(),
            fail_update: false,
            panic_update: false,
            state: Arc::new(TestPluginState::default()),
        }
    }

    fn with_command(mut self, command: &str) -> Self {
        self.commands
            .push(CommandSpec::new(command, format!("{} command", command)));
        self
    }

    fn failing_update(mut self) -> Self {
        self.fail_update = true;
        self
    }

    fn panicking_update(mut self) -> Self {
        self.panic_update = true;
        self
    }
}

#[async_trait]
impl Plugin for TestPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    async fn init(&mut self, _storage: PluginStorage) -> Result<(), PluginError> {
        Ok(())
    }

    fn commands(&self) -> Vec<CommandSpec> {
        self.commands.clone()
    }

    async fn update(
        &self,
        _ctx: &HostContext,
        _guild: &GuildContext,
    ) -> HookResult<Option<QueuedAction>> {
        if self.panic_update {
            panic!("simulated update panic");
        }
        if self.fail_update {
            return Err(HookError::Failed("simulated update failure".into()));
        }
        self.state.updates.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    fn command_hooks(&self) -> Option<&dyn CommandHooks> {
        Some(self)
    }
}

#[async_trait]
impl CommandHooks for TestPlugin {
    async fn on_command(
        &self,
        _ctx: &HostContext,
        invocation: &CommandInvocation,
    ) -> HookResult<()> {
        self.state
            .handled_commands
            .lock()
            .unwrap()
            .push(invocation.name.clone());
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    plugin_dir: std::path::PathBuf,
    database: Database,
    registrar: Arc<RecordingRegistrar>,
    host: PluginHost,
}

fn harness() -> Harness {
    ensure_init();
    let dir = tempfile::tempdir().unwrap();
    let plugin_dir = dir.path().join("plugins");
    std::fs::create_dir_all(&plugin_dir).unwrap();
    let database = Database::open(dir.path().join("bot.db"));
    database.initialize().unwrap();
    let registrar = Arc::new(RecordingRegistrar::default());
    let host = PluginHost::new(
        database.clone(),
        Arc::new(CapabilityRegistry::new()),
        Arc::clone(&registrar) as Arc<dyn CommandRegistrar>,
        &plugin_dir,
    );
    Harness {
        _dir: dir,
        plugin_dir,
        database,
        registrar,
        host,
    }
}

fn module_with(plugins: Vec<TestPlugin>, version: &str) -> ModuleRegistrar {
    let mut registrar = ModuleRegistrar::new();
    registrar.set_version(version);
    for plugin in plugins {
        registrar.register_plugin(move || Ok(Box::new(plugin) as Box<dyn Plugin>));
    }
    registrar
}

#[tokio::test]
async fn first_plugin_wins_command_conflicts() {
    let mut h = harness();

    let module = module_with(
        vec![
            TestPlugin::new("A").with_command("ping"),
            TestPlugin::new("B").with_command("ping"),
        ],
        "1.0",
    );
    let summary = h.host.load_registered_module("mod_ab", module).await;
    assert_eq!(summary.plugins_loaded, 2);

    let owner = h.database.select(
        "SELECT plugin_name FROM command_info WHERE command_name = 'ping'",
        &[],
    );
    assert_eq!(owner, vec!["A"]);
    assert!(h.host.check_command_conflict("B", "ping"));
    assert!(!h.host.check_command_conflict("A", "ping"));
    assert_eq!(h.registrar.published(), vec!["ping"]);
}

#[tokio::test]
async fn empty_command_name_always_conflicts() {
    let h = harness();
    assert!(h.host.check_command_conflict("anyone", ""));
}

#[tokio::test]
async fn weather_owns_the_contested_command() {
    let mut h = harness();

    let weather = module_with(vec![TestPlugin::new("Weather").with_command("weather")], "1.0");
    let game = module_with(vec![TestPlugin::new("Game").with_command("weather")], "1.0");
    h.host.load_registered_module("weather_module", weather).await;
    h.host.load_registered_module("game_module", game).await;

    let owners = h.database.select(
        "SELECT plugin_name FROM command_info WHERE command_name = 'weather'",
        &[],
    );
    assert_eq!(owners, vec!["Weather"]);
    assert!(h.host.check_command_conflict("Game", "weather"));
}

#[tokio::test]
async fn version_drift_resets_command_flag_and_persists_new_version() {
    let mut h = harness();

    let module = module_with(vec![TestPlugin::new("Weather").with_command("forecast")], "1.0");
    h.host.load_registered_module("weather_module", module).await;

    let stored = PluginConfig::load(&h.plugin_dir, "weather_module")
        .unwrap()
        .unwrap();
    assert_eq!(stored.version, "1.0");
    assert!(stored.global_commands_created);
    assert_eq!(h.registrar.published(), vec!["forecast"]);

    // Same module, new version: the one-time pass runs again.
    let module = module_with(vec![TestPlugin::new("Weather").with_command("forecast")], "1.1");
    h.host.load_registered_module("weather_module", module).await;

    let stored = PluginConfig::load(&h.plugin_dir, "weather_module")
        .unwrap()
        .unwrap();
    assert_eq!(stored.version, "1.1");
    assert!(stored.global_commands_created);
    assert_eq!(h.registrar.published(), vec!["forecast", "forecast"]);

    // Matching version: flags untouched, nothing re-published.
    let module = module_with(vec![TestPlugin::new("Weather").with_command("forecast")], "1.1");
    h.host.load_registered_module("weather_module", module).await;
    assert_eq!(h.registrar.published().len(), 2);
}

#[tokio::test]
async fn identity_is_reconciled_against_the_metadata_store() {
    let mut h = harness();

    let module = module_with(vec![TestPlugin::new("OldName")], "1.0");
    h.host.load_registered_module("renaming_module", module).await;
    let stored = h.database.select(
        "SELECT plugin_name FROM plugin_properties WHERE module_name = 'renaming_module'",
        &[],
    );
    assert_eq!(stored, vec!["OldName"]);

    let module = module_with(vec![TestPlugin::new("NewName")], "1.0");
    h.host.load_registered_module("renaming_module", module).await;
    let stored = h.database.select(
        "SELECT plugin_name FROM plugin_properties WHERE module_name = 'renaming_module'",
        &[],
    );
    assert_eq!(stored, vec!["NewName"]);
}

#[tokio::test]
async fn unnamed_plugin_falls_back_to_module_name() {
    let mut h = harness();

    let module = module_with(vec![TestPlugin::new("")], "1.0");
    h.host.load_registered_module("fallback_module", module).await;

    let names: Vec<String> = h
        .host
        .registry()
        .get_all_base()
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(names, vec!["fallback_module"]);
}

#[tokio::test]
async fn failing_update_hook_does_not_block_other_plugins() {
    let mut h = harness();

    let healthy = TestPlugin::new("healthy");
    let healthy_state = Arc::clone(&healthy.state);
    let module = module_with(
        vec![TestPlugin::new("broken").failing_update(), healthy],
        "1.0",
    );
    h.host.load_registered_module("tick_module", module).await;
    h.host.ensure_guild_settings(42, "!");

    let registry = h.host.registry();
    let ctx = Arc::new(HostContext::new(Arc::new(LoggingClient), vec![42]));
    let queue = Arc::new(ActionQueue::new());
    run_tick(&h.database, &registry, &ctx, &queue).await;

    assert_eq!(healthy_state.updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panicking_update_hook_does_not_block_other_plugins() {
    let mut h = harness();

    let healthy = TestPlugin::new("healthy");
    let healthy_state = Arc::clone(&healthy.state);
    let module = module_with(
        vec![TestPlugin::new("unwinding").panicking_update(), healthy],
        "1.0",
    );
    h.host.load_registered_module("panic_module", module).await;
    h.host.ensure_guild_settings(42, "!");

    let registry = h.host.registry();
    let ctx = Arc::new(HostContext::new(Arc::new(LoggingClient), vec![42]));
    let queue = Arc::new(ActionQueue::new());
    run_tick(&h.database, &registry, &ctx, &queue).await;
    run_tick(&h.database, &registry, &ctx, &queue).await;

    assert_eq!(healthy_state.updates.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn guilds_without_settings_rows_are_not_polled() {
    let mut h = harness();

    let plugin = TestPlugin::new("poller");
    let state = Arc::clone(&plugin.state);
    let module = module_with(vec![plugin], "1.0");
    h.host.load_registered_module("poll_module", module).await;

    let registry = h.host.registry();
    let ctx = Arc::new(HostContext::new(Arc::new(LoggingClient), vec![]));
    let queue = Arc::new(ActionQueue::new());
    run_tick(&h.database, &registry, &ctx, &queue).await;
    assert_eq!(state.updates.load(Ordering::SeqCst), 0);

    h.host.ensure_guild_settings(7, "!");
    h.host.ensure_guild_settings(8, "!");
    run_tick(&h.database, &registry, &ctx, &queue).await;
    assert_eq!(state.updates.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn commands_route_only_to_the_owning_plugin() {
    let mut h = harness();

    let weather = TestPlugin::new("Weather").with_command("weather");
    let game = TestPlugin::new("Game").with_command("play");
    let weather_state = Arc::clone(&weather.state);
    let game_state = Arc::clone(&game.state);
    let module = module_with(vec![weather, game], "1.0");
    h.host.load_registered_module("routing_module", module).await;

    let ctx = Arc::new(HostContext::new(Arc::new(LoggingClient), vec![]));
    let dispatcher = EventDispatcher::new(h.host.registry(), h.database.clone(), ctx);
    dispatcher.dispatch_command(CommandInvocation {
        name: "weather".to_string(),
        guild_id: Some(1),
        channel_id: 2,
        user_id: 3,
        options: serde_json::Value::Null,
    });

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(
        weather_state.handled_commands.lock().unwrap().clone(),
        vec!["weather"]
    );
    assert!(game_state.handled_commands.lock().unwrap().is_empty());
}
