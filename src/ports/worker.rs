//! Worker Port - Strategy Process Launch Interface
//!
//! Defines how the orchestrator starts, stops and polls the isolated
//! worker process behind each slot. The orchestrator owns the returned
//! handle exclusively for the lifetime of the slot.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::topic::StrategyId;

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
  /// Whether the process exited with status 0.
  pub success: bool,
  /// Exit code, absent when terminated by a signal.
  pub code: Option<i32>,
}

/// Handle to one running worker process.
#[async_trait]
pub trait WorkerProcess: Send + Sync {
  /// OS process id, if still known.
  fn pid(&self) -> Option<u32>;

  /// Terminate the process, waiting at most `grace` for it to exit.
  async fn terminate(&mut self, grace: Duration) -> anyhow::Result<()>;

  /// Non-blocking exit check used by the reaper.
  ///
  /// Returns `Ok(None)` while the process is alive.
  fn try_exit(&mut self) -> anyhow::Result<Option<WorkerExit>>;
}

/// Trait for worker launch providers.
///
/// Implementors start a strategy worker bound to the leased port. The
/// orchestrator never inspects how the worker is run.
#[async_trait]
pub trait WorkerLauncher: Send + Sync + 'static {
  /// Launch the worker for `strategy_id` listening on `port`.
  ///
  /// # Errors
  /// Returns error if the process could not be spawned.
  async fn launch(
    &self,
    strategy_id: StrategyId,
    port: u16,
  ) -> anyhow::Result<Box<dyn WorkerProcess>>;
}
