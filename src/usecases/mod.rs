//! Use Cases Layer - Application Business Logic
//!
//! Combines domain logic with port interfaces to implement the gateway's
//! core workflows. Each use case is a self-contained operation.
//!
//! Use cases:
//! - `ProcessOrchestrator`: Port leasing and worker slot lifecycle
//! - `ConnectionRegistry`: Connected observers and topic membership
//! - `HeartbeatMonitor`: Stale-connection ping and eviction
//! - `BroadcastRouter`: Topic fan-out with dead-connection reaping
//! - `PushService`: Named broadcast helpers
//! - `StrategyControl`: Start/stop flow and exit reaper
//! - `MonitoringCollector`: Snapshot pushes and threshold alerts

pub mod alert_monitor;
pub mod broadcaster;
pub mod connection_registry;
pub mod heartbeat_monitor;
pub mod lifecycle;
pub mod orchestrator;
pub mod push;
