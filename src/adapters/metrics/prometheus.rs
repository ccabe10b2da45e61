//! Prometheus Metrics Registry - Gateway Observability
//!
//! Registers the gateway's counters and gauges, implements the
//! `Telemetry` port on top of them, and serves `/metrics`.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::domain::capacity::CapacityInfo;
use crate::ports::telemetry::Telemetry;

/// Centralized Prometheus metrics for the gateway.
///
/// All metrics follow the naming convention `strategy_gateway_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Observers currently connected.
    pub active_connections: IntGauge,
    /// Workers currently holding a slot.
    pub running_workers: IntGauge,
    /// Ports left in the pool.
    pub pool_available: IntGauge,
    /// Fan-outs by topic.
    pub broadcasts: IntCounterVec,
    /// Individual delivery failures.
    pub deliveries_failed: IntCounter,
    /// Forced disconnects by reason.
    pub evictions: IntCounterVec,
    /// Refused start requests by error code.
    pub start_rejections: IntCounterVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let active_connections = IntGauge::new(
            "strategy_gateway_active_connections",
            "Connected WebSocket observers",
        )?;

        let running_workers = IntGauge::new(
            "strategy_gateway_running_workers",
            "Strategy workers holding a port",
        )?;

        let pool_available = IntGauge::new(
            "strategy_gateway_pool_available",
            "Ports available for new workers",
        )?;

        let broadcasts = IntCounterVec::new(
            Opts::new("strategy_gateway_broadcasts_total", "Broadcast fan-outs"),
            &["topic"],
        )?;

        let deliveries_failed = IntCounter::new(
            "strategy_gateway_deliveries_failed_total",
            "Per-connection delivery failures",
        )?;

        let evictions = IntCounterVec::new(
            Opts::new(
                "strategy_gateway_evictions_total",
                "Connections forcibly removed",
            ),
            &["reason"],
        )?;

        let start_rejections = IntCounterVec::new(
            Opts::new(
                "strategy_gateway_start_rejections_total",
                "Strategy start requests refused",
            ),
            &["reason"],
        )?;

        // Register all metrics
        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(running_workers.clone()))?;
        registry.register(Box::new(pool_available.clone()))?;
        registry.register(Box::new(broadcasts.clone()))?;
        registry.register(Box::new(deliveries_failed.clone()))?;
        registry.register(Box::new(evictions.clone()))?;
        registry.register(Box::new(start_rejections.clone()))?;

        Ok(Self {
            registry,
            active_connections,
            running_workers,
            pool_available,
            broadcasts,
            deliveries_failed,
            evictions,
            start_rejections,
        })
    }

    /// Render the registry in the text exposition format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            error!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

#[allow(clippy::cast_possible_wrap)]
impl Telemetry for MetricsRegistry {
    fn broadcast_sent(&self, topic: &str, _recipients: usize) {
        self.broadcasts.with_label_values(&[topic]).inc();
    }

    fn delivery_failed(&self) {
        self.deliveries_failed.inc();
    }

    fn client_evicted(&self, reason: &str) {
        self.evictions.with_label_values(&[reason]).inc();
    }

    fn start_rejected(&self, reason: &str) {
        self.start_rejections.with_label_values(&[reason]).inc();
    }

    fn capacity_observed(&self, info: &CapacityInfo) {
        self.running_workers.set(info.running as i64);
        self.pool_available.set(info.available as i64);
    }

    fn connections_observed(&self, count: usize) {
        self.active_connections.set(count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_updates_exposition() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.broadcast_sent("signals", 3);
        metrics.broadcast_sent("signals", 0);
        metrics.client_evicted("heartbeat_timeout");
        metrics.start_rejected("capacity_exceeded");
        metrics.capacity_observed(&CapacityInfo::new(10, 4, 6));
        metrics.connections_observed(2);

        assert_eq!(metrics.broadcasts.with_label_values(&["signals"]).get(), 2);
        assert_eq!(metrics.running_workers.get(), 4);
        assert_eq!(metrics.pool_available.get(), 6);

        let text = metrics.render().unwrap();
        assert!(text.contains("strategy_gateway_evictions_total{reason=\"heartbeat_timeout\"} 1"));
        assert!(text.contains("strategy_gateway_active_connections 2"));
    }
}
