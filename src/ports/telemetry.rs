//! Telemetry Port - Counters and Gauges Emitted by the Core
//!
//! Every method has a no-op default so tests and embedders can pass
//! `NoopTelemetry`. The Prometheus adapter implements the full set.

use crate::domain::capacity::CapacityInfo;

/// Sink for gateway counters and gauges.
pub trait Telemetry: Send + Sync + 'static {
  /// A broadcast was fanned out to `recipients` connections.
  fn broadcast_sent(&self, _topic: &str, _recipients: usize) {}

  /// A single delivery failed.
  fn delivery_failed(&self) {}

  /// A connection was forcibly removed (`delivery_failed`, `heartbeat_timeout`).
  fn client_evicted(&self, _reason: &str) {}

  /// A start request was rejected with the given error code.
  fn start_rejected(&self, _reason: &str) {}

  /// Latest capacity figures.
  fn capacity_observed(&self, _info: &CapacityInfo) {}

  /// Latest connection count.
  fn connections_observed(&self, _count: usize) {}
}

/// Telemetry sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {}
