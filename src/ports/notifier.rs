//! Alert Notifier Port - External Notification Dispatch
//!
//! Channel notifications (email, chat) are delivered by a dispatcher
//! outside this crate. The core only hands it the alert.

use async_trait::async_trait;

use crate::domain::monitoring::SystemAlert;

/// Trait for alert notification sinks.
#[async_trait]
pub trait AlertNotifier: Send + Sync + 'static {
  /// Dispatch a system alert.
  async fn notify(&self, alert: &SystemAlert) -> anyhow::Result<()>;
}
