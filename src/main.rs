//! Strategy Gateway - Entry Point
//!
//! Initializes configuration and logging, wires the orchestrator and the
//! fan-out layer, and runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create Prometheus registry (the `Telemetry` sink)
//! 4. Create orchestrator (process launcher) and connection registry
//! 5. Create broadcast router, push facade, strategy control
//! 6. Spawn control/WebSocket server, health server, metrics server
//! 7. Spawn heartbeat monitor, worker reaper, monitoring collector,
//!    config watcher
//! 8. Wait for SIGINT → graceful shutdown

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use strategy_gateway::adapters::http::{self, AppState};
use strategy_gateway::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use strategy_gateway::adapters::notify::LogNotifier;
use strategy_gateway::adapters::process::ProcessLauncher;
use strategy_gateway::adapters::system::SysinfoMetrics;
use strategy_gateway::config::{self, hot_reload::ConfigWatcher};
use strategy_gateway::ports::telemetry::{NoopTelemetry, Telemetry};
use strategy_gateway::ports::transport::ClientTransport;
use strategy_gateway::usecases::alert_monitor::MonitoringCollector;
use strategy_gateway::usecases::broadcaster::BroadcastRouter;
use strategy_gateway::usecases::connection_registry::ConnectionRegistry;
use strategy_gateway::usecases::heartbeat_monitor::{HeartbeatMonitor, HeartbeatSettings};
use strategy_gateway::usecases::lifecycle::StrategyControl;
use strategy_gateway::usecases::orchestrator::ProcessOrchestrator;
use strategy_gateway::usecases::push::PushService;

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config(CONFIG_PATH)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.gateway.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.gateway.name,
        version = env!("CARGO_PKG_VERSION"),
        base_port = config.orchestrator.base_port,
        max_workers = config.orchestrator.max_workers,
        "Starting strategy gateway"
    );

    // ── 3. Shutdown channels ────────────────────────────────
    // Background tasks stop first; servers stop last so observers
    // still see the final worker-stopped pushes.
    let (tasks_tx, _) = broadcast::channel::<()>(1);
    let (servers_tx, _) = broadcast::channel::<()>(1);

    // ── 4. Telemetry sink ───────────────────────────────────
    let metrics = if config.metrics.enabled {
        Some(Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?))
    } else {
        None
    };
    let telemetry: Arc<dyn Telemetry> = match &metrics {
        Some(m) => Arc::clone(m) as Arc<dyn Telemetry>,
        None => Arc::new(NoopTelemetry),
    };

    // ── 5. Core components ──────────────────────────────────
    let launcher = Arc::new(ProcessLauncher::new(config.orchestrator.worker_command.clone()));
    let orchestrator = Arc::new(ProcessOrchestrator::new(launcher, &config.orchestrator));
    let registry = Arc::new(ConnectionRegistry::new());
    let router = Arc::new(BroadcastRouter::new(Arc::clone(&registry), Arc::clone(&telemetry)));
    let push = PushService::new(router);
    let control = Arc::new(StrategyControl::new(
        Arc::clone(&orchestrator),
        push.clone(),
        Arc::clone(&telemetry),
    ));
    telemetry.capacity_observed(&orchestrator.capacity_info().await);

    // ── 6. Servers ──────────────────────────────────────────
    let app_state = Arc::new(AppState {
        control: Arc::clone(&control),
        registry: Arc::clone(&registry),
        telemetry: Arc::clone(&telemetry),
        client_buffer: config.server.client_buffer,
    });
    let control_handle = tokio::spawn({
        let bind = config.server.bind_address.clone();
        let shutdown = servers_tx.subscribe();
        async move {
            if let Err(e) = http::serve(app_state, bind, shutdown).await {
                error!(error = %e, "Control server failed");
            }
        }
    });

    let health = Arc::new(HealthState::new());
    let health_handle = tokio::spawn({
        let server = HealthServer::new(Arc::clone(&health), config.server.health_port);
        let shutdown = servers_tx.subscribe();
        async move {
            if let Err(e) = server.run(shutdown).await {
                error!(error = %e, "Health server failed");
            }
        }
    });

    let metrics_handle = metrics.map(|metrics| {
        let bind = config.metrics.bind_address.clone();
        let shutdown = servers_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = metrics.serve(bind, shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        })
    });

    // ── 7. Background tasks ─────────────────────────────────
    let heartbeat = HeartbeatMonitor::new(
        Arc::clone(&registry),
        HeartbeatSettings::from(&config.heartbeat),
        Arc::clone(&telemetry),
    )
    .spawn();

    let reaper_handle = tokio::spawn({
        let control = Arc::clone(&control);
        let interval = Duration::from_secs(config.orchestrator.reap_interval_seconds);
        let shutdown = tasks_tx.subscribe();
        async move { control.run_reaper(interval, shutdown).await }
    });

    let (mut watcher, config_rx) = ConfigWatcher::new(CONFIG_PATH, config.clone());
    let watcher_handle = tokio::spawn({
        let shutdown = tasks_tx.subscribe();
        async move {
            if let Err(e) = watcher.run(shutdown).await {
                error!(error = %e, "Config watcher failed");
            }
        }
    });

    let collector = MonitoringCollector::new(
        Arc::clone(&orchestrator),
        Arc::clone(&registry),
        push,
        Arc::new(SysinfoMetrics::new()),
        Arc::new(LogNotifier::new(&config.gateway.name)),
        Arc::clone(&telemetry),
        config_rx,
    );
    let collector_handle = tokio::spawn(collector.run(tasks_tx.subscribe()));

    info!("All tasks spawned, gateway is running");

    // ── 8. Wait for SIGINT ──────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for SIGINT, shutting down");
    }
    info!("SIGINT received, initiating graceful shutdown");

    // 1. Readiness probe → 503
    health.begin_shutdown();

    // 2. Heartbeat monitor, awaited
    heartbeat.shutdown().await;

    // 3. Collector, reaper, config watcher
    let _ = tasks_tx.send(());
    for handle in [collector_handle, reaper_handle, watcher_handle] {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!("Background task did not stop within 5s");
        }
    }

    // 4. Every worker
    let stopped = control.stop_all().await;
    info!(stopped, "Workers stopped");

    // 5. Observers, then servers
    let mut closed = 0usize;
    for entry in registry.heartbeat_snapshot().await {
        if entry.transport.close().await.is_ok() {
            closed += 1;
        }
    }
    info!(closed, "Observer connections closed");

    let _ = servers_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(5), control_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}
