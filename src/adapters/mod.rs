//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (child processes, WebSockets, HTTP, host
//! sampling). Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `http`: Strategy control endpoints and the `/ws` upgrade
//! - `ws`: WebSocket transport and client protocol
//! - `process`: Worker launcher over `tokio::process`
//! - `system`: Host CPU / memory / disk via `sysinfo`
//! - `notify`: Alert notification sink
//! - `metrics`: Prometheus metrics export and health checks

pub mod http;
pub mod metrics;
pub mod notify;
pub mod process;
pub mod system;
pub mod ws;
