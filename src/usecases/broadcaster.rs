//! Broadcast Router - Topic Fan-out with Dead-Connection Reaping
//!
//! Serializes a message once, resolves recipients from the registry and
//! delivers to each of them concurrently. A failed delivery evicts that
//! recipient and never affects the others.

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::domain::topic::Topic;
use crate::ports::telemetry::Telemetry;
use crate::usecases::connection_registry::{ClientId, ConnectionRegistry, Recipient};

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
  /// Recipients that accepted the message.
  pub delivered: usize,
  /// Recipients that failed and were evicted.
  pub evicted: Vec<ClientId>,
}

/// Routes messages to topic subscribers or to every connection.
pub struct BroadcastRouter {
  registry: Arc<ConnectionRegistry>,
  telemetry: Arc<dyn Telemetry>,
}

impl BroadcastRouter {
  /// Create a router over a registry.
  pub fn new(registry: Arc<ConnectionRegistry>, telemetry: Arc<dyn Telemetry>) -> Self {
    Self {
      registry,
      telemetry,
    }
  }

  /// Registry the router reads from.
  pub fn registry(&self) -> &Arc<ConnectionRegistry> {
    &self.registry
  }

  /// Deliver `message` to `topic` subscribers, or to everyone when `topic` is `None`.
  pub async fn broadcast<T: Serialize + ?Sized>(
    &self,
    message: &T,
    topic: Option<Topic>,
  ) -> DeliveryReport {
    let payload = match serde_json::to_string(message) {
      Ok(payload) => payload,
      Err(e) => {
        error!(error = %e, "Failed to serialize broadcast message");
        return DeliveryReport::default();
      }
    };

    let recipients = self.registry.recipients(topic).await;
    let label = topic.map_or_else(|| "global".to_string(), |t| t.name());
    self.telemetry.broadcast_sent(&label, recipients.len());
    if recipients.is_empty() {
      return DeliveryReport::default();
    }

    let payload = payload.as_str();
    let results = join_all(recipients.into_iter().map(|recipient| async move {
      let outcome = recipient.transport.send(payload).await;
      (recipient, outcome)
    }))
    .await;

    let mut report = DeliveryReport::default();
    for (recipient, outcome) in results {
      match outcome {
        Ok(()) => report.delivered += 1,
        Err(e) => {
          warn!(client_id = %recipient.client_id, topic = %label, error = %e, "Delivery failed, evicting client");
          if self.evict(&recipient).await {
            report.evicted.push(recipient.client_id);
          }
        }
      }
    }

    debug!(
      topic = %label,
      delivered = report.delivered,
      evicted = report.evicted.len(),
      "Broadcast complete"
    );
    report
  }

  /// Deliver `message` to a single client. Returns whether it was accepted.
  pub async fn send_personal_message<T: Serialize + ?Sized>(
    &self,
    message: &T,
    client_id: &str,
  ) -> bool {
    let Some(recipient) = self.registry.recipient(client_id).await else {
      debug!(client_id, "Personal message to unknown client dropped");
      return false;
    };

    let payload = match serde_json::to_string(message) {
      Ok(payload) => payload,
      Err(e) => {
        error!(error = %e, "Failed to serialize personal message");
        return false;
      }
    };

    match recipient.transport.send(&payload).await {
      Ok(()) => true,
      Err(e) => {
        warn!(client_id, error = %e, "Personal delivery failed, evicting client");
        self.evict(&recipient).await;
        false
      }
    }
  }

  /// Drop the failed session and close its transport.
  ///
  /// Only the session that failed is removed; a newer connection under the
  /// same id is left alone. Returns whether the registry dropped anything.
  async fn evict(&self, recipient: &Recipient) -> bool {
    self.telemetry.delivery_failed();
    let removed = self
      .registry
      .disconnect_session(&recipient.client_id, recipient.session)
      .await;
    if removed {
      self.telemetry.client_evicted("delivery_failed");
    }
    // Best effort: the transport already failed once.
    if let Err(e) = recipient.transport.close().await {
      debug!(client_id = %recipient.client_id, error = %e, "Ignoring close error on evicted client");
    }
    removed
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use async_trait::async_trait;
  use serde_json::json;

  use super::*;
  use crate::domain::error::DeliveryError;
  use crate::ports::telemetry::NoopTelemetry;
  use crate::ports::transport::ClientTransport;
  use crate::usecases::connection_registry::SessionId;

  #[derive(Default)]
  struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    fail: bool,
  }

  #[async_trait]
  impl ClientTransport for RecordingTransport {
    async fn send(&self, payload: &str) -> Result<(), DeliveryError> {
      if self.fail {
        return Err(DeliveryError::Closed);
      }
      self.sent.lock().unwrap().push(payload.to_string());
      Ok(())
    }

    async fn close(&self) -> Result<(), DeliveryError> {
      Err(DeliveryError::Closed)
    }
  }

  async fn setup() -> (Arc<ConnectionRegistry>, BroadcastRouter) {
    let registry = Arc::new(ConnectionRegistry::new());
    let router = BroadcastRouter::new(Arc::clone(&registry), Arc::new(NoopTelemetry));
    (registry, router)
  }

  #[tokio::test]
  async fn test_topic_broadcast_reaches_only_subscribers() {
    let (registry, router) = setup().await;
    let a = Arc::new(RecordingTransport::default());
    let b = Arc::new(RecordingTransport::default());
    registry.connect(a.clone(), "a").await.unwrap();
    registry.connect(b.clone(), "b").await.unwrap();
    registry.subscribe("a", "signals").await;

    let report = router.broadcast(&json!({"n": 1}), Some(Topic::Signals)).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(a.sent.lock().unwrap().len(), 1);
    assert!(b.sent.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_failing_recipient_evicted_without_affecting_others() {
    let (registry, router) = setup().await;
    let good = Arc::new(RecordingTransport::default());
    let bad = Arc::new(RecordingTransport {
      fail: true,
      ..Default::default()
    });
    registry.connect(good.clone(), "good").await.unwrap();
    registry.connect(bad, "bad").await.unwrap();
    registry.subscribe("good", "signals").await;
    registry.subscribe("bad", "signals").await;

    let report = router.broadcast(&json!({"n": 1}), Some(Topic::Signals)).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.evicted, vec!["bad".to_string()]);
    assert!(!registry.is_connected("bad").await);
    assert_eq!(registry.subscriber_count(Topic::Signals).await, 1);

    let report = router.broadcast(&json!({"n": 2}), Some(Topic::Signals)).await;
    assert_eq!(report.delivered, 1);
    assert!(report.evicted.is_empty());
    assert_eq!(good.sent.lock().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn test_global_broadcast_reaches_everyone() {
    let (registry, router) = setup().await;
    let a = Arc::new(RecordingTransport::default());
    let b = Arc::new(RecordingTransport::default());
    registry.connect(a.clone(), "a").await.unwrap();
    registry.connect(b.clone(), "b").await.unwrap();
    registry.subscribe("a", "monitoring").await;

    let report = router.broadcast(&json!({"alert": true}), None).await;
    assert_eq!(report.delivered, 2);
  }

  #[tokio::test]
  async fn test_per_connection_order_preserved() {
    let (registry, router) = setup().await;
    let a = Arc::new(RecordingTransport::default());
    registry.connect(a.clone(), "a").await.unwrap();
    registry.subscribe("a", "logs").await;

    for n in 0..5 {
      router.broadcast(&json!({"n": n}), Some(Topic::Logs)).await;
    }

    let sent = a.sent.lock().unwrap();
    let order: Vec<i64> = sent
      .iter()
      .map(|s| serde_json::from_str::<serde_json::Value>(s).unwrap()["n"].as_i64().unwrap())
      .collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
  }

  /// Fails after the registry has already swapped in a new session.
  struct ReplacedTransport {
    registry: Arc<ConnectionRegistry>,
    session: Mutex<Option<SessionId>>,
    successor: Arc<RecordingTransport>,
  }

  #[async_trait]
  impl ClientTransport for ReplacedTransport {
    async fn send(&self, _payload: &str) -> Result<(), DeliveryError> {
      let session = self.session.lock().unwrap().take();
      if let Some(session) = session {
        self.registry.disconnect_session("a", session).await;
        self
          .registry
          .connect(self.successor.clone(), "a")
          .await
          .unwrap();
      }
      Err(DeliveryError::Closed)
    }

    async fn close(&self) -> Result<(), DeliveryError> {
      Ok(())
    }
  }

  #[tokio::test]
  async fn test_stale_failure_does_not_evict_reconnected_client() {
    let (registry, router) = setup().await;
    let successor = Arc::new(RecordingTransport::default());
    let old = Arc::new(ReplacedTransport {
      registry: Arc::clone(&registry),
      session: Mutex::new(None),
      successor: successor.clone(),
    });
    let session = registry.connect(old.clone(), "a").await.unwrap();
    *old.session.lock().unwrap() = Some(session);
    registry.subscribe("a", "signals").await;

    let report = router.broadcast(&json!({"n": 1}), Some(Topic::Signals)).await;
    assert_eq!(report.delivered, 0);
    assert!(report.evicted.is_empty());
    assert!(registry.is_connected("a").await);

    // The reconnected client is reachable.
    assert!(router.send_personal_message(&json!({"n": 2}), "a").await);
    assert_eq!(successor.sent.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_personal_message_failure_evicts() {
    let (registry, router) = setup().await;
    let bad = Arc::new(RecordingTransport {
      fail: true,
      ..Default::default()
    });
    registry.connect(bad, "bad").await.unwrap();

    assert!(!router.send_personal_message(&json!({}), "bad").await);
    assert!(!registry.is_connected("bad").await);
    assert!(!router.send_personal_message(&json!({}), "ghost").await);
  }
}
