//! # nudged: desktop companion trigger daemon
//!
//! Composition root that wires all adapters together and starts the engine.
//!
//! ## Responsibilities
//! - Load configuration (`nudge.toml`, `NUDGE_*` env vars)
//! - Initialise `tracing` with an `EnvFilter`
//! - Build the sensor probe: mock file first when debug triggering is on,
//!   live readings otherwise
//! - Register the built-in plugins and spawn the engine
//! - Load the active character pack's rules
//! - Serve the HTTP collaborator surface
//! - Shut down on Ctrl-C or when an action chain runs `exit_app`
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use nudge_adapter_http_axum::router;
use nudge_adapter_http_axum::state::AppState;
use nudge_adapter_mock::MockSensorProbe;
use nudge_adapter_storage_json::manifest::PackLocator;
use nudge_adapter_storage_json::{JsonCounterStore, JsonPackRepository};
use nudge_adapter_sysinfo::LiveSensorProbe;
use nudge_app::engine::Engine;
use nudge_app::event_bus::InProcessSignalBus;
use nudge_app::plugin_registry::PluginRegistry;
use nudge_app::ports::Fallback;
use nudge_app::services::rule_service::RuleService;

use crate::config::Config;

const SIGNAL_BUS_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config.logging.filter);

    let locator = PackLocator::new(&config.packs.dir);
    let bus = InProcessSignalBus::new(SIGNAL_BUS_CAPACITY);

    let mut plugins = PluginRegistry::new();
    for plugin in nudge_adapter_sysinfo::builtin() {
        plugins.register(plugin);
    }

    let mock = config
        .behavior
        .debug_trigger
        .then(|| MockSensorProbe::new(&config.sensors.mock_file));
    if mock.is_some() {
        tracing::warn!(file = %config.sensors.mock_file.display(), "debug triggering on, mock sensors take precedence");
    }
    let probe = Fallback::new(mock, LiveSensorProbe::new(config.live_options()));

    let engine = Engine::spawn(
        config.engine_config(),
        probe,
        plugins,
        bus.clone(),
        JsonCounterStore::new(locator.clone()),
    );

    let rules = Arc::new(RuleService::new(
        JsonPackRepository::new(locator),
        engine.handle(),
        config.packs.active.clone(),
    ));
    if let Err(err) = rules.reload().await {
        tracing::error!(error = %err, pack = %config.packs.active, "starting without rules");
    }

    let app = router::build(AppState::new(engine.handle(), rules, bus));
    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "nudged listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(engine.handle().exit_requested()))
        .await
        .context("server error")?;

    engine.shutdown().await;
    Ok(())
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter {filter:?} ({err}), falling back to info");
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal(mut exit: watch::Receiver<bool>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let exit_requested = async move {
        if exit.wait_for(|requested| *requested).await.is_err() {
            tracing::warn!("engine stopped before exit was requested");
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("ctrl-c received, shutting down"),
        () = exit_requested => tracing::info!("exit requested by action chain, shutting down"),
    }
}
