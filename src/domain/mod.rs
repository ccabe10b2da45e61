//! Domain layer - Core gateway models.
//!
//! Port leasing, capacity arithmetic, topics, message envelopes and alert
//! evaluation. Nothing here performs I/O; every type is testable in
//! isolation.

pub mod capacity;
pub mod envelope;
pub mod error;
pub mod monitoring;
pub mod port_pool;
pub mod topic;

// Re-export core types for convenience
pub use capacity::CapacityInfo;
pub use envelope::{ControlMessage, PushMessage, StrategyStatus};
pub use error::{DeliveryError, OrchestratorError, RegistryError};
pub use monitoring::{
    AlertKind, AlertLatch, AlertLevel, AlertThresholds, MonitoringSnapshot, SystemAlert,
    SystemMetrics,
};
pub use port_pool::{PortLedger, PortPool};
pub use topic::{StrategyId, Topic};
