//! Alert Notification Adapter - Structured Log Sink
//!
//! Default `AlertNotifier`. Channel delivery (email, chat) belongs to an
//! external dispatcher that tails these records.

use async_trait::async_trait;
use tracing::{error, warn};

use crate::domain::monitoring::{AlertLevel, SystemAlert};
use crate::ports::notifier::AlertNotifier;

/// Writes every alert as a `notification` log record.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier {
    gateway: String,
}

impl LogNotifier {
    pub fn new(gateway: &str) -> Self {
        Self {
            gateway: gateway.to_string(),
        }
    }
}

#[async_trait]
impl AlertNotifier for LogNotifier {
    async fn notify(&self, alert: &SystemAlert) -> anyhow::Result<()> {
        match alert.level {
            AlertLevel::Critical => error!(
                target: "notification",
                gateway = %self.gateway,
                kind = alert.kind.event_type(),
                value = alert.value,
                threshold = alert.threshold,
                "{}",
                alert.message
            ),
            AlertLevel::Warning => warn!(
                target: "notification",
                gateway = %self.gateway,
                kind = alert.kind.event_type(),
                value = alert.value,
                threshold = alert.threshold,
                "{}",
                alert.message
            ),
        }
        Ok(())
    }
}
