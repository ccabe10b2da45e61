//! Heartbeat Monitor - Periodic Stale-Connection Sweep
//!
//! Every `check_interval` the monitor walks the registry once:
//! - older than `timeout` → forced close and disconnect
//! - older than `ping_ratio * timeout` → unilateral ping
//!
//! A ping never refreshes the server-side heartbeat; only a client
//! heartbeat does. Sweeps never overlap: the loop awaits each sweep
//! before sleeping again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::HeartbeatConfig;
use crate::domain::envelope::ControlMessage;
use crate::ports::telemetry::Telemetry;
use crate::usecases::connection_registry::{ClientId, ConnectionRegistry};

/// Sweep timing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartbeatSettings {
  /// Period between sweeps.
  pub check_interval: Duration,
  /// Age after which a connection is evicted.
  pub timeout: Duration,
  /// Fraction of `timeout` after which a ping is sent.
  pub ping_ratio: f64,
}

impl Default for HeartbeatSettings {
  fn default() -> Self {
    Self {
      check_interval: Duration::from_secs(10),
      timeout: Duration::from_secs(30),
      ping_ratio: 0.7,
    }
  }
}

impl From<&HeartbeatConfig> for HeartbeatSettings {
  fn from(config: &HeartbeatConfig) -> Self {
    Self {
      check_interval: Duration::from_secs(config.check_interval_seconds),
      timeout: Duration::from_secs(config.timeout_seconds),
      ping_ratio: config.ping_ratio,
    }
  }
}

impl HeartbeatSettings {
  /// Age after which a ping is sent.
  pub fn ping_after(&self) -> Duration {
    self.timeout.mul_f64(self.ping_ratio)
  }
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
  /// Clients that received a ping.
  pub pinged: Vec<ClientId>,
  /// Clients forcibly disconnected.
  pub evicted: Vec<ClientId>,
}

/// Background sweeper over the connection registry.
pub struct HeartbeatMonitor {
  registry: Arc<ConnectionRegistry>,
  settings: HeartbeatSettings,
  telemetry: Arc<dyn Telemetry>,
}

impl HeartbeatMonitor {
  /// Create a monitor.
  pub fn new(
    registry: Arc<ConnectionRegistry>,
    settings: HeartbeatSettings,
    telemetry: Arc<dyn Telemetry>,
  ) -> Self {
    Self {
      registry,
      settings,
      telemetry,
    }
  }

  /// Run a single sweep.
  pub async fn sweep(&self) -> SweepReport {
    let ping_after = self.settings.ping_after();
    let ping_payload = match serde_json::to_string(&ControlMessage::ping()) {
      Ok(payload) => payload,
      Err(e) => {
        warn!(error = %e, "Failed to serialize ping");
        String::new()
      }
    };

    let mut report = SweepReport::default();
    let mut marked = Vec::new();

    for entry in self.registry.heartbeat_snapshot().await {
      if entry.elapsed > self.settings.timeout {
        marked.push(entry);
      } else if entry.elapsed > ping_after {
        match entry.transport.send(&ping_payload).await {
          Ok(()) => {
            debug!(client_id = %entry.client_id, elapsed_ms = entry.elapsed.as_millis() as u64, "Heartbeat ping sent");
            report.pinged.push(entry.client_id);
          }
          Err(e) => {
            warn!(client_id = %entry.client_id, error = %e, "Heartbeat ping failed");
            marked.push(entry);
          }
        }
      }
    }

    for entry in marked {
      if let Err(e) = entry.transport.close().await {
        debug!(client_id = %entry.client_id, error = %e, "Ignoring close error on stale client");
      }
      // A reconnect since the snapshot owns the id now; leave it alone.
      if self
        .registry
        .disconnect_session(&entry.client_id, entry.session)
        .await
      {
        info!(client_id = %entry.client_id, "Stale connection evicted");
        self.telemetry.client_evicted("heartbeat_timeout");
        report.evicted.push(entry.client_id);
      }
    }

    report
  }

  /// Sweep every `check_interval` until shutdown.
  #[instrument(skip(self, shutdown_rx))]
  pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
    info!(
      interval_s = self.settings.check_interval.as_secs(),
      timeout_s = self.settings.timeout.as_secs(),
      "Heartbeat monitor started"
    );

    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Heartbeat monitor shutting down");
          return;
        }
        () = tokio::time::sleep(self.settings.check_interval) => {
          let report = self.sweep().await;
          if !report.evicted.is_empty() || !report.pinged.is_empty() {
            debug!(
              pinged = report.pinged.len(),
              evicted = report.evicted.len(),
              "Heartbeat sweep complete"
            );
          }
        }
      }
    }
  }

  /// Spawn the sweep loop with its own shutdown channel.
  pub fn spawn(self) -> HeartbeatHandle {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let join = tokio::spawn(self.run(shutdown_rx));
    HeartbeatHandle { shutdown_tx, join }
  }
}

/// Handle to a spawned heartbeat monitor.
pub struct HeartbeatHandle {
  shutdown_tx: broadcast::Sender<()>,
  join: JoinHandle<()>,
}

impl HeartbeatHandle {
  /// Cancel the monitor and wait for the loop to exit.
  pub async fn shutdown(self) {
    let _ = self.shutdown_tx.send(());
    if let Err(e) = self.join.await {
      warn!(error = %e, "Heartbeat monitor task ended abnormally");
    }
  }
}
