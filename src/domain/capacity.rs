//! Capacity snapshot reported by the orchestrator.

use serde::Serialize;

/// Point-in-time capacity figures.
///
/// `available` is the literal pool cardinality, not `max_workers - running`.
/// The two only agree when every lease is paired with a slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CapacityInfo {
    /// Capacity ceiling.
    pub max_workers: usize,
    /// Active slots.
    pub running: usize,
    /// Ports currently in the pool.
    pub available: usize,
    /// `running / max_workers * 100`.
    pub utilization_percent: f64,
    /// Whether another start request would pass the ceiling check.
    pub can_start_more: bool,
}

impl CapacityInfo {
    /// Build a snapshot from raw counts.
    pub fn new(max_workers: usize, running: usize, available: usize) -> Self {
        let utilization_percent = if max_workers == 0 {
            0.0
        } else {
            running as f64 / max_workers as f64 * 100.0
        };

        Self {
            max_workers,
            running,
            available,
            utilization_percent,
            can_start_more: running < max_workers,
        }
    }
}
