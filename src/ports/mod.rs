//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires
//! from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `WorkerLauncher`: Strategy worker process lifecycle
//! - `ClientTransport`: Outbound delivery to one connected observer
//! - `AlertNotifier`: External notification dispatch
//! - `SystemMetricsSource`: Host CPU / memory / disk sampling
//! - `Telemetry`: Counters and gauges

pub mod notifier;
pub mod system_metrics;
pub mod telemetry;
pub mod transport;
pub mod worker;
