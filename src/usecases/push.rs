//! Push Facade - Named Broadcast Helpers
//!
//! Shapes domain events into the common `PushMessage` envelope and hands
//! them to the broadcast router. Every helper returns the router's
//! delivery report.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::domain::capacity::CapacityInfo;
use crate::domain::envelope::{PushMessage, StrategyStatus};
use crate::domain::monitoring::{MonitoringSnapshot, SystemAlert};
use crate::domain::topic::{StrategyId, Topic};
use crate::usecases::broadcaster::{BroadcastRouter, DeliveryReport};

/// Semantic push helpers over a `BroadcastRouter`.
#[derive(Clone)]
pub struct PushService {
  router: Arc<BroadcastRouter>,
}

impl PushService {
  /// Create the facade over a router.
  pub fn new(router: Arc<BroadcastRouter>) -> Self {
    Self { router }
  }

  /// Router the helpers publish through.
  pub fn router(&self) -> &Arc<BroadcastRouter> {
    &self.router
  }

  /// New signal to `signals` subscribers.
  pub async fn push_signal(&self, signal: Value) -> DeliveryReport {
    let message = PushMessage::for_topic("signal", Topic::Signals, signal);
    self.router.broadcast(&message, Some(Topic::Signals)).await
  }

  /// Strategy status transition to `strategies` subscribers.
  ///
  /// `extra` object fields are merged into the payload next to
  /// `strategy_id` and `status`.
  pub async fn push_strategy_status(
    &self,
    strategy_id: StrategyId,
    status: &str,
    extra: Option<Value>,
  ) -> DeliveryReport {
    let status = StrategyStatus::parse(status);
    let mut data = json!({
      "strategy_id": strategy_id,
      "status": status.as_str(),
    });
    if let (Some(Value::Object(extra)), Some(target)) = (extra, data.as_object_mut()) {
      for (key, value) in extra {
        target.entry(key).or_insert(value);
      }
    }

    let message = PushMessage::for_topic("strategy_status", Topic::Strategies, data)
      .with_event_type(status.event_type());
    self.router.broadcast(&message, Some(Topic::Strategies)).await
  }

  /// Monitoring snapshot to `monitoring` subscribers.
  pub async fn push_monitoring(&self, snapshot: &MonitoringSnapshot) -> DeliveryReport {
    let data = serde_json::to_value(snapshot).unwrap_or(Value::Null);
    let message = PushMessage::for_topic("monitoring", Topic::Monitoring, data);
    self.router.broadcast(&message, Some(Topic::Monitoring)).await
  }

  /// Capacity snapshot to `capacity` subscribers.
  pub async fn push_capacity(&self, capacity: &CapacityInfo) -> DeliveryReport {
    let data = serde_json::to_value(capacity).unwrap_or(Value::Null);
    let message = PushMessage::for_topic("capacity", Topic::Capacity, data);
    self.router.broadcast(&message, Some(Topic::Capacity)).await
  }

  /// System alert to every connection, regardless of subscriptions.
  pub async fn push_system_alert(&self, alert: &SystemAlert) -> DeliveryReport {
    let data = serde_json::to_value(alert).unwrap_or(Value::Null);
    let message = PushMessage::event("system_alert", alert.kind.event_type(), data);
    self.router.broadcast(&message, None).await
  }

  /// Log line to `logs`, and to `strategy_<id>_logs` when tied to a strategy.
  ///
  /// Returns the report of the `logs` fan-out followed by the per-strategy one.
  pub async fn push_log(
    &self,
    strategy_id: Option<StrategyId>,
    level: &str,
    message: &str,
  ) -> Vec<DeliveryReport> {
    let data = json!({
      "strategy_id": strategy_id,
      "level": level,
      "message": message,
    });

    let mut reports = Vec::with_capacity(2);
    let general = PushMessage::for_topic("log", Topic::Logs, data.clone());
    reports.push(self.router.broadcast(&general, Some(Topic::Logs)).await);

    if let Some(id) = strategy_id {
      let topic = Topic::StrategyLogs(id);
      let scoped = PushMessage::for_topic("log", topic, data);
      reports.push(self.router.broadcast(&scoped, Some(topic)).await);
    }
    reports
  }
}
