//! HTTP Control Surface - Strategy Lifecycle, Capacity and WebSocket Upgrade
//!
//! Thin axum layer over `StrategyControl` and the connection registry.
//! Handlers translate paths and bodies; every decision stays in the
//! use cases.

pub mod error;

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, instrument};

pub use error::ApiError;

use crate::adapters::ws::ws_handler;
use crate::domain::capacity::CapacityInfo;
use crate::domain::topic::StrategyId;
use crate::ports::telemetry::Telemetry;
use crate::usecases::connection_registry::ConnectionRegistry;
use crate::usecases::lifecycle::StrategyControl;
use crate::usecases::orchestrator::WorkerInfo;

/// State shared by every route.
pub struct AppState {
    pub control: Arc<StrategyControl>,
    pub registry: Arc<ConnectionRegistry>,
    pub telemetry: Arc<dyn Telemetry>,
    /// Outbound queue depth per WebSocket.
    pub client_buffer: usize,
}

/// Body of a successful start.
#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub strategy_id: StrategyId,
    pub port: u16,
    pub pid: Option<u32>,
}

/// Body of a stop.
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub strategy_id: StrategyId,
    pub stopped: bool,
}

/// Build the control router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/strategies", get(list_strategies))
        .route("/strategies/:id/start", post(start_strategy))
        .route("/strategies/:id/stop", post(stop_strategy))
        .route("/capacity", get(capacity))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Serve the control router until shutdown.
#[instrument(skip(state, shutdown_rx))]
pub async fn serve(
    state: Arc<AppState>,
    bind_address: String,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "Control server started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    Ok(())
}

async fn start_strategy(
    State(state): State<Arc<AppState>>,
    Path(strategy_id): Path<StrategyId>,
) -> Result<Json<StartResponse>, ApiError> {
    let worker = state.control.start(strategy_id).await?;
    Ok(Json(StartResponse {
        strategy_id,
        port: worker.port,
        pid: worker.pid,
    }))
}

async fn stop_strategy(
    State(state): State<Arc<AppState>>,
    Path(strategy_id): Path<StrategyId>,
) -> Json<StopResponse> {
    let stopped = state.control.stop(strategy_id).await;
    Json(StopResponse {
        strategy_id,
        stopped,
    })
}

async fn capacity(State(state): State<Arc<AppState>>) -> Json<CapacityInfo> {
    Json(state.control.orchestrator().capacity_info().await)
}

async fn list_strategies(State(state): State<Arc<AppState>>) -> Json<Vec<WorkerInfo>> {
    Json(state.control.orchestrator().running_workers().await)
}
