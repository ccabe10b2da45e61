//! Process Orchestrator - Port Leasing and Worker Lifecycle
//!
//! Owns the port ledger and the worker slots drawn from it:
//! - Preferred-port-first allocation with `min(pool)` fallback
//! - Hard ceiling on concurrently running workers
//! - Worker launch, stop and exit reaping
//! - Capacity introspection
//!
//! Ledger and slot map are mutated together under a single async mutex,
//! so concurrent starts never double-lease a port.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::config::OrchestratorConfig;
use crate::domain::capacity::CapacityInfo;
use crate::domain::error::OrchestratorError;
use crate::domain::port_pool::PortLedger;
use crate::domain::topic::StrategyId;
use crate::ports::worker::{WorkerExit, WorkerLauncher, WorkerProcess};

/// Public view of an active slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
  /// Strategy holding the slot.
  pub strategy_id: StrategyId,
  /// Leased port.
  pub port: u16,
  /// OS process id, absent while the worker is still launching.
  pub pid: Option<u32>,
  /// When the port was leased.
  pub started_at: DateTime<Utc>,
}

/// One allocated worker. The process is `None` between lease and launch,
/// and while a stop is terminating it.
struct WorkerSlot {
  port: u16,
  process: Option<Box<dyn WorkerProcess>>,
  started_at: DateTime<Utc>,
  /// Set by the first `stop`; later stops back off.
  stopping: bool,
}

struct OrchestratorState {
  ledger: PortLedger,
  slots: HashMap<StrategyId, WorkerSlot>,
}

impl OrchestratorState {
  /// Return the port, then drop the slot.
  fn release(&mut self, strategy_id: StrategyId) -> Option<WorkerSlot> {
    let port = self.ledger.release(strategy_id)?;
    let slot = self.slots.remove(&strategy_id);
    if slot.is_none() {
      error!(
        strategy_id,
        port,
        "Lease without slot: orchestrator state out of sync"
      );
    }
    slot
  }
}

/// Capacity-bounded worker orchestrator.
pub struct ProcessOrchestrator {
  /// Worker launch port.
  launcher: Arc<dyn WorkerLauncher>,
  /// Ledger + slots, mutated as a pair.
  state: Mutex<OrchestratorState>,
  /// Grace period for worker termination.
  stop_timeout: Duration,
}

impl ProcessOrchestrator {
  /// Create an orchestrator from config.
  pub fn new(launcher: Arc<dyn WorkerLauncher>, config: &OrchestratorConfig) -> Self {
    Self::with_range(
      launcher,
      config.base_port,
      config.max_workers,
      Duration::from_millis(config.stop_timeout_ms),
    )
  }

  /// Create an orchestrator over an explicit port range.
  pub fn with_range(
    launcher: Arc<dyn WorkerLauncher>,
    base_port: u16,
    max_workers: usize,
    stop_timeout: Duration,
  ) -> Self {
    info!(base_port, max_workers, "Port pool initialized");
    Self {
      launcher,
      state: Mutex::new(OrchestratorState {
        ledger: PortLedger::new(base_port, max_workers),
        slots: HashMap::new(),
      }),
      stop_timeout,
    }
  }

  /// Lease a port and register an empty slot for `strategy_id`.
  ///
  /// # Errors
  /// `CapacityExceeded`, `AlreadyRunning` or `PortConflict`.
  pub async fn allocate(&self, strategy_id: StrategyId) -> Result<u16, OrchestratorError> {
    let mut state = self.state.lock().await;
    let port = state.ledger.allocate(strategy_id)?;
    state.slots.insert(
      strategy_id,
      WorkerSlot {
        port,
        process: None,
        started_at: Utc::now(),
        stopping: false,
      },
    );
    debug!(strategy_id, port, "Port allocated");
    Ok(port)
  }

  /// Return the strategy's port to the pool and drop its slot.
  ///
  /// Idempotent. A still-attached process handle is dropped, which kills it.
  pub async fn release(&self, strategy_id: StrategyId) -> Option<u16> {
    let mut state = self.state.lock().await;
    let slot = state.release(strategy_id)?;
    debug!(strategy_id, port = slot.port, "Port released");
    Some(slot.port)
  }

  /// Current capacity figures.
  pub async fn capacity_info(&self) -> CapacityInfo {
    self.state.lock().await.ledger.capacity_info()
  }

  /// Allocate a port, launch the worker on it and attach the process.
  ///
  /// On launch failure the port is released before returning.
  #[instrument(skip(self))]
  pub async fn start(&self, strategy_id: StrategyId) -> Result<WorkerInfo, OrchestratorError> {
    let port = self.allocate(strategy_id).await?;

    let process = match self.launcher.launch(strategy_id, port).await {
      Ok(process) => process,
      Err(e) => {
        self.release(strategy_id).await;
        error!(strategy_id, port, error = %e, "Worker launch failed");
        return Err(OrchestratorError::LaunchFailed {
          strategy_id,
          reason: e.to_string(),
        });
      }
    };

    let mut state = self.state.lock().await;
    let (attached, owns_release) = match state.slots.get_mut(&strategy_id) {
      Some(slot) if slot.port == port && slot.process.is_none() && !slot.stopping => {
        let info = WorkerInfo {
          strategy_id,
          port,
          pid: process.pid(),
          started_at: slot.started_at,
        };
        slot.process = Some(process);
        (Ok(info), false)
      }
      // A stop arrived mid-launch and left the release to us.
      Some(slot) if slot.port == port && slot.stopping => (Err(process), true),
      _ => (Err(process), false),
    };
    drop(state);

    match attached {
      Ok(info) => {
        info!(strategy_id, port, pid = ?info.pid, "Worker started");
        Ok(info)
      }
      Err(mut process) => {
        warn!(strategy_id, port, "Slot stopped while launching: terminating worker");
        if let Err(e) = process.terminate(self.stop_timeout).await {
          warn!(strategy_id, error = %e, "Failed to terminate orphaned worker");
        }
        if owns_release {
          self.release(strategy_id).await;
        }
        Err(OrchestratorError::LaunchFailed {
          strategy_id,
          reason: "stopped during launch".to_string(),
        })
      }
    }
  }

  /// Terminate the worker and release its port.
  ///
  /// The port stays leased until the process has exited, so it is never
  /// handed to a new worker while the old one may still hold it. Only the
  /// first caller terminates and releases; a concurrent stop of the same
  /// strategy returns `false`, as does a stop of a strategy not running.
  /// A stop during launch returns `true` and leaves the release to `start`.
  #[instrument(skip(self))]
  pub async fn stop(&self, strategy_id: StrategyId) -> bool {
    let process = {
      let mut state = self.state.lock().await;
      match state.slots.get_mut(&strategy_id) {
        Some(slot) if slot.stopping => {
          debug!(strategy_id, "Stop already in progress");
          return false;
        }
        Some(slot) => {
          slot.stopping = true;
          slot.process.take()
        }
        None => return false,
      }
    };

    let Some(mut process) = process else {
      info!(strategy_id, "Stop requested during launch");
      return true;
    };
    if let Err(e) = process.terminate(self.stop_timeout).await {
      warn!(strategy_id, error = %e, "Worker did not terminate cleanly");
    }

    let port = self.release(strategy_id).await;
    info!(strategy_id, port = ?port, "Worker stopped");
    true
  }

  /// Release every slot whose process has exited on its own.
  pub async fn reap_exited(&self) -> Vec<(StrategyId, WorkerExit)> {
    let mut state = self.state.lock().await;

    let mut exited = Vec::new();
    for (strategy_id, slot) in &mut state.slots {
      let Some(process) = slot.process.as_mut() else {
        continue;
      };
      match process.try_exit() {
        Ok(Some(exit)) => exited.push((*strategy_id, exit)),
        Ok(None) => {}
        Err(e) => warn!(strategy_id, error = %e, "Failed to poll worker status"),
      }
    }

    for (strategy_id, exit) in &exited {
      if let Some(slot) = state.release(*strategy_id) {
        warn!(
          strategy_id,
          port = slot.port,
          code = ?exit.code,
          success = exit.success,
          "Worker exited, slot reaped"
        );
      }
    }

    exited
  }

  /// Snapshot of every active slot, sorted by strategy id.
  pub async fn running_workers(&self) -> Vec<WorkerInfo> {
    let state = self.state.lock().await;
    let mut workers: Vec<WorkerInfo> = state
      .slots
      .iter()
      .map(|(strategy_id, slot)| WorkerInfo {
        strategy_id: *strategy_id,
        port: slot.port,
        pid: slot.process.as_ref().and_then(|p| p.pid()),
        started_at: slot.started_at,
      })
      .collect();
    workers.sort_by_key(|w| w.strategy_id);
    workers
  }

  /// Whether the strategy holds a slot.
  pub async fn is_running(&self, strategy_id: StrategyId) -> bool {
    self.state.lock().await.slots.contains_key(&strategy_id)
  }

  /// Port leased to the strategy.
  pub async fn port_of(&self, strategy_id: StrategyId) -> Option<u16> {
    self.state.lock().await.ledger.port_of(strategy_id)
  }

  /// Stop every worker. Returns the strategies this call stopped, sorted.
  ///
  /// Slots already being stopped or reaped elsewhere are not included.
  pub async fn shutdown(&self) -> Vec<StrategyId> {
    let ids: Vec<StrategyId> = self.state.lock().await.slots.keys().copied().collect();
    info!(workers = ids.len(), "Stopping all workers");

    let outcomes = join_all(ids.into_iter().map(|id| async move { (id, self.stop(id).await) })).await;
    let mut stopped: Vec<StrategyId> = outcomes
      .into_iter()
      .filter_map(|(id, stopped)| stopped.then_some(id))
      .collect();
    stopped.sort_unstable();
    stopped
  }
}
