//! Monitoring Collector - Periodic Snapshot Push and Threshold Alerts
//!
//! Each tick samples host metrics, pushes a monitoring and a capacity
//! snapshot, then evaluates alert thresholds. A newly raised alert goes
//! to two independent sinks at once: a global push and the notifier.
//! Thresholds are read from the hot-reload channel on every tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::config::AppConfig;
use crate::domain::monitoring::{AlertLatch, MonitoringSnapshot, SystemAlert};
use crate::ports::notifier::AlertNotifier;
use crate::ports::system_metrics::SystemMetricsSource;
use crate::ports::telemetry::Telemetry;
use crate::usecases::connection_registry::ConnectionRegistry;
use crate::usecases::orchestrator::ProcessOrchestrator;
use crate::usecases::push::PushService;

/// Collaborators the collector reads from and pushes to.
pub struct MonitoringCollector {
  orchestrator: Arc<ProcessOrchestrator>,
  registry: Arc<ConnectionRegistry>,
  push: PushService,
  metrics: Arc<dyn SystemMetricsSource>,
  notifier: Arc<dyn AlertNotifier>,
  telemetry: Arc<dyn Telemetry>,
  config_rx: watch::Receiver<AppConfig>,
  latch: AlertLatch,
}

impl MonitoringCollector {
  /// Create a collector. Thresholds and cadence are read from `config_rx`
  /// on every tick, so reloads apply without a restart.
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    orchestrator: Arc<ProcessOrchestrator>,
    registry: Arc<ConnectionRegistry>,
    push: PushService,
    metrics: Arc<dyn SystemMetricsSource>,
    notifier: Arc<dyn AlertNotifier>,
    telemetry: Arc<dyn Telemetry>,
    config_rx: watch::Receiver<AppConfig>,
  ) -> Self {
    Self {
      orchestrator,
      registry,
      push,
      metrics,
      notifier,
      telemetry,
      config_rx,
      latch: AlertLatch::new(),
    }
  }

  /// Sample once, push snapshots, and raise any newly crossed alerts.
  ///
  /// Returns the alerts raised on this tick.
  pub async fn collect_once(&mut self) -> Vec<SystemAlert> {
    let system = match self.metrics.sample().await {
      Ok(system) => system,
      Err(e) => {
        warn!(error = %e, "System metrics sample failed, skipping tick");
        return Vec::new();
      }
    };
    let capacity = self.orchestrator.capacity_info().await;
    let connections = self.registry.connection_count().await;

    self.telemetry.capacity_observed(&capacity);
    self.telemetry.connections_observed(connections);

    let snapshot = MonitoringSnapshot {
      system,
      capacity,
      connections,
    };
    self.push.push_monitoring(&snapshot).await;
    self.push.push_capacity(&capacity).await;

    let thresholds = self.config_rx.borrow().alerts.thresholds();
    let alerts = self.latch.evaluate(&thresholds, &system, &capacity);
    for alert in &alerts {
      warn!(
        kind = ?alert.kind,
        level = ?alert.level,
        value = alert.value,
        threshold = alert.threshold,
        "{}",
        alert.message
      );
      let (report, notified) = tokio::join!(
        self.push.push_system_alert(alert),
        self.notifier.notify(alert),
      );
      debug!(delivered = report.delivered, "System alert pushed");
      if let Err(e) = notified {
        error!(error = %e, kind = ?alert.kind, "Alert notification failed");
      }
    }
    alerts
  }

  /// Collect on the configured interval until shutdown.
  #[instrument(skip(self, shutdown_rx))]
  pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
    info!("Monitoring collector started");
    loop {
      let interval = Duration::from_secs(self.config_rx.borrow().alerts.collect_interval_seconds);
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Monitoring collector shutting down");
          return;
        }
        () = tokio::time::sleep(interval) => {
          self.collect_once().await;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use async_trait::async_trait;

  use super::*;
  use crate::domain::monitoring::{AlertKind, SystemMetrics};
  use crate::ports::telemetry::NoopTelemetry;
  use crate::ports::worker::{WorkerLauncher, WorkerProcess};
  use crate::usecases::broadcaster::BroadcastRouter;

  struct ScriptedMetrics(Mutex<Vec<SystemMetrics>>);

  #[async_trait]
  impl SystemMetricsSource for ScriptedMetrics {
    async fn sample(&self) -> anyhow::Result<SystemMetrics> {
      self
        .0
        .lock()
        .unwrap()
        .pop()
        .ok_or_else(|| anyhow::anyhow!("script exhausted"))
    }
  }

  #[derive(Default)]
  struct CountingNotifier(Mutex<Vec<AlertKind>>);

  #[async_trait]
  impl AlertNotifier for CountingNotifier {
    async fn notify(&self, alert: &SystemAlert) -> anyhow::Result<()> {
      self.0.lock().unwrap().push(alert.kind);
      Ok(())
    }
  }

  struct NeverLauncher;

  #[async_trait]
  impl WorkerLauncher for NeverLauncher {
    async fn launch(&self, _id: u32, _port: u16) -> anyhow::Result<Box<dyn WorkerProcess>> {
      anyhow::bail!("not used")
    }
  }

  fn metrics(cpu: f64) -> SystemMetrics {
    SystemMetrics {
      cpu_percent: cpu,
      memory_percent: 10.0,
      disk_percent: 10.0,
    }
  }

  fn collector(
    script: Vec<SystemMetrics>,
    notifier: Arc<CountingNotifier>,
  ) -> (MonitoringCollector, watch::Sender<AppConfig>) {
    let registry = Arc::new(ConnectionRegistry::new());
    let telemetry: Arc<dyn Telemetry> = Arc::new(NoopTelemetry);
    let router = Arc::new(BroadcastRouter::new(Arc::clone(&registry), Arc::clone(&telemetry)));
    let orchestrator = Arc::new(ProcessOrchestrator::with_range(
      Arc::new(NeverLauncher),
      9000,
      10,
      Duration::from_millis(10),
    ));
    let (config_tx, config_rx) = watch::channel(AppConfig::default());
    // Popped from the back.
    let mut script = script;
    script.reverse();
    (
      MonitoringCollector::new(
        orchestrator,
        registry,
        PushService::new(router),
        Arc::new(ScriptedMetrics(Mutex::new(script))),
        notifier,
        telemetry,
        config_rx,
      ),
      config_tx,
    )
  }

  #[tokio::test]
  async fn test_alert_fires_once_per_crossing() {
    let notifier = Arc::new(CountingNotifier::default());
    let (mut collector, _tx) = collector(
      vec![metrics(50.0), metrics(92.0), metrics(97.0), metrics(40.0), metrics(91.0)],
      Arc::clone(&notifier),
    );

    assert!(collector.collect_once().await.is_empty());
    assert_eq!(collector.collect_once().await.len(), 1);
    // Still above: latched, no repeat.
    assert!(collector.collect_once().await.is_empty());
    // Falls back under: re-arms.
    assert!(collector.collect_once().await.is_empty());
    assert_eq!(collector.collect_once().await.len(), 1);

    assert_eq!(*notifier.0.lock().unwrap(), vec![AlertKind::Cpu, AlertKind::Cpu]);
  }

  #[tokio::test]
  async fn test_reloaded_threshold_applies_next_tick() {
    let notifier = Arc::new(CountingNotifier::default());
    let (mut collector, tx) =
      collector(vec![metrics(70.0), metrics(70.0)], Arc::clone(&notifier));

    assert!(collector.collect_once().await.is_empty());

    let mut config = AppConfig::default();
    config.alerts.cpu_percent = 60.0;
    tx.send(config).unwrap();

    let alerts = collector.collect_once().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].threshold, 60.0);
  }

  #[tokio::test]
  async fn test_sample_failure_skips_tick() {
    let notifier = Arc::new(CountingNotifier::default());
    let (mut collector, _tx) = collector(Vec::new(), Arc::clone(&notifier));
    assert!(collector.collect_once().await.is_empty());
    assert!(notifier.0.lock().unwrap().is_empty());
  }
}
