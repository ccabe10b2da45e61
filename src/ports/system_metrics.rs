//! System Metrics Port - Host Resource Sampling

use async_trait::async_trait;

use crate::domain::monitoring::SystemMetrics;

/// Trait for host resource samplers.
#[async_trait]
pub trait SystemMetricsSource: Send + Sync + 'static {
  /// Take one CPU / memory / disk sample.
  async fn sample(&self) -> anyhow::Result<SystemMetrics>;
}
