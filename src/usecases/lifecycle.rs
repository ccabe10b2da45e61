//! Strategy Lifecycle - Start/Stop Flow and Exit Reaper
//!
//! Couples the orchestrator to the push facade. The orchestrator never
//! references connections; this use case is the only place a worker
//! transition turns into a broadcast.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::domain::error::OrchestratorError;
use crate::domain::topic::StrategyId;
use crate::ports::telemetry::Telemetry;
use crate::ports::worker::WorkerExit;
use crate::usecases::orchestrator::{ProcessOrchestrator, WorkerInfo};
use crate::usecases::push::PushService;

/// Start/stop entry point used by the HTTP layer.
pub struct StrategyControl {
  orchestrator: Arc<ProcessOrchestrator>,
  push: PushService,
  telemetry: Arc<dyn Telemetry>,
}

impl StrategyControl {
  /// Create the control over an orchestrator and the push facade.
  pub fn new(
    orchestrator: Arc<ProcessOrchestrator>,
    push: PushService,
    telemetry: Arc<dyn Telemetry>,
  ) -> Self {
    Self {
      orchestrator,
      push,
      telemetry,
    }
  }

  /// Orchestrator behind the control, for capacity and listing queries.
  pub fn orchestrator(&self) -> &Arc<ProcessOrchestrator> {
    &self.orchestrator
  }

  /// Start a worker and announce it.
  ///
  /// # Errors
  /// Propagates the orchestrator's rejection unchanged.
  #[instrument(skip(self))]
  pub async fn start(&self, strategy_id: StrategyId) -> Result<WorkerInfo, OrchestratorError> {
    match self.orchestrator.start(strategy_id).await {
      Ok(worker) => {
        self
          .push
          .push_strategy_status(
            strategy_id,
            "started",
            Some(json!({ "port": worker.port, "pid": worker.pid })),
          )
          .await;
        self.publish_capacity().await;
        Ok(worker)
      }
      Err(e) => {
        warn!(strategy_id, code = e.code(), error = %e, "Start rejected");
        self.telemetry.start_rejected(e.code());
        Err(e)
      }
    }
  }

  /// Stop a worker. Returns `false` when it was not running.
  #[instrument(skip(self))]
  pub async fn stop(&self, strategy_id: StrategyId) -> bool {
    let stopped = self.orchestrator.stop(strategy_id).await;
    if stopped {
      self.push.push_strategy_status(strategy_id, "stopped", None).await;
      self.publish_capacity().await;
    }
    stopped
  }

  /// Stop every running worker, announcing each one this call stopped.
  /// Returns how many stopped.
  pub async fn stop_all(&self) -> usize {
    let stopped = self.orchestrator.shutdown().await;
    for strategy_id in &stopped {
      self
        .push
        .push_strategy_status(*strategy_id, "stopped", None)
        .await;
    }
    self.publish_capacity().await;
    stopped.len()
  }

  /// Release every worker that exited on its own and announce each exit.
  pub async fn reap_once(&self) -> Vec<(StrategyId, WorkerExit)> {
    let exited = self.orchestrator.reap_exited().await;
    for (strategy_id, exit) in &exited {
      let status = if exit.success { "stopped" } else { "error" };
      self
        .push
        .push_strategy_status(*strategy_id, status, Some(json!({ "exit_code": exit.code })))
        .await;
    }
    if !exited.is_empty() {
      self.publish_capacity().await;
    }
    exited
  }

  /// Poll for exited workers every `interval` until shutdown.
  #[instrument(skip(self, shutdown_rx))]
  pub async fn run_reaper(&self, interval: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
    info!(interval_s = interval.as_secs(), "Worker reaper started");
    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Worker reaper shutting down");
          return;
        }
        () = tokio::time::sleep(interval) => {
          let exited = self.reap_once().await;
          if !exited.is_empty() {
            info!(count = exited.len(), "Reaped exited workers");
          }
        }
      }
    }
  }

  async fn publish_capacity(&self) {
    let capacity = self.orchestrator.capacity_info().await;
    self.telemetry.capacity_observed(&capacity);
    self.push.push_capacity(&capacity).await;
  }
}
