//! Metrics and Monitoring Adapters
//!
//! Provides Prometheus metrics export and health check endpoints
//! (/live, /ready) via axum 0.7. `MetricsRegistry` is also the
//! production `Telemetry` sink.

pub mod health;
pub mod prometheus;

pub use health::{HealthServer, HealthState};
pub use prometheus::MetricsRegistry;
