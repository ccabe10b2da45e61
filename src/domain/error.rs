//! Error taxonomy for the orchestrator and the fan-out layer.

use thiserror::Error;

use super::topic::StrategyId;

/// Errors returned by port allocation and the worker lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    /// The running worker count has reached the configured ceiling.
    #[error("capacity exceeded: {running}/{max} workers running")]
    CapacityExceeded {
        /// Workers currently holding a slot.
        running: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// The pool invariant is broken (a port would be leased or returned twice).
    #[error("port conflict on {port}: {detail}")]
    PortConflict {
        /// Port involved in the conflict.
        port: u16,
        /// What was observed.
        detail: String,
    },

    /// The strategy already holds a slot.
    #[error("strategy {strategy_id} is already running on port {port}")]
    AlreadyRunning {
        /// Strategy holding the slot.
        strategy_id: StrategyId,
        /// Port leased to that slot.
        port: u16,
    },

    /// The worker process could not be launched.
    #[error("failed to launch worker for strategy {strategy_id}: {reason}")]
    LaunchFailed {
        /// Strategy whose worker failed.
        strategy_id: StrategyId,
        /// Launcher error message.
        reason: String,
    },
}

impl OrchestratorError {
    /// Stable machine-readable code for API responses and metrics labels.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::PortConflict { .. } => "port_conflict",
            Self::AlreadyRunning { .. } => "already_running",
            Self::LaunchFailed { .. } => "launch_failed",
        }
    }
}

/// Errors from connection registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A connection with this client id is already registered.
    #[error("client {0} is already connected")]
    DuplicateClient(String),
}

/// Per-recipient delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The transport has been closed.
    #[error("transport closed")]
    Closed,

    /// The outbound queue is full (slow consumer).
    #[error("outbound queue full")]
    QueueFull,

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_exceeded_is_distinct() {
        let err = OrchestratorError::CapacityExceeded { running: 3, max: 3 };
        assert_eq!(err.code(), "capacity_exceeded");
        assert!(err.to_string().contains("capacity exceeded"));

        let launch = OrchestratorError::LaunchFailed {
            strategy_id: 1,
            reason: "no such file".to_string(),
        };
        assert_ne!(err.code(), launch.code());
    }
}
