//! Port pool and slot ledger.
//!
//! The pool is the closed set of ports in `[base_port, base_port + capacity)`.
//! The ledger pairs every leased port with the strategy holding it, so that
//! `pool.len() + leases.len() == capacity` holds after every call.

use std::collections::{BTreeSet, HashMap};

use tracing::error;

use super::capacity::CapacityInfo;
use super::error::OrchestratorError;
use super::topic::StrategyId;

/// Reusable set of free ports.
///
/// Ordered so that the fallback lease is always `min(pool)`.
#[derive(Debug, Clone)]
pub struct PortPool {
    base_port: u16,
    capacity: usize,
    free: BTreeSet<u16>,
}

impl PortPool {
    /// Create a pool of `capacity` contiguous ports starting at `base_port`.
    ///
    /// The range is clipped at `u16::MAX`; config validation rejects ranges
    /// that would overflow.
    pub fn new(base_port: u16, capacity: usize) -> Self {
        let free: BTreeSet<u16> = (0..capacity)
            .map_while(|offset| u16::try_from(offset).ok())
            .map_while(|offset| base_port.checked_add(offset))
            .collect();
        let capacity = free.len();

        Self {
            base_port,
            capacity,
            free,
        }
    }

    /// First port of the range.
    pub const fn base_port(&self) -> u16 {
        self.base_port
    }

    /// Size of the range.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Ports currently free.
    pub fn len(&self) -> usize {
        self.free.len()
    }

    /// Whether every port is leased.
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Whether `port` is currently free.
    pub fn contains(&self, port: u16) -> bool {
        self.free.contains(&port)
    }

    /// Whether `port` belongs to the range at all.
    pub fn in_range(&self, port: u16) -> bool {
        port >= self.base_port && usize::from(port - self.base_port) < self.capacity
    }

    /// Preferred port of a strategy: `base_port + strategy_id`.
    pub fn preferred_port(&self, strategy_id: StrategyId) -> Option<u16> {
        u32::from(self.base_port)
            .checked_add(strategy_id)
            .and_then(|p| u16::try_from(p).ok())
    }

    /// Lease the preferred port if free, else the smallest free port.
    pub fn lease(&mut self, strategy_id: StrategyId) -> Option<u16> {
        if let Some(preferred) = self.preferred_port(strategy_id) {
            if self.free.remove(&preferred) {
                return Some(preferred);
            }
        }
        self.free.pop_first()
    }

    /// Put a port back. Returns `false` if it was already free or is out of range.
    pub fn restore(&mut self, port: u16) -> bool {
        self.in_range(port) && self.free.insert(port)
    }

    /// Snapshot of the free ports in ascending order.
    pub fn free_ports(&self) -> Vec<u16> {
        self.free.iter().copied().collect()
    }
}

/// Pool plus the strategy → port leases drawn from it.
#[derive(Debug, Clone)]
pub struct PortLedger {
    pool: PortPool,
    max_workers: usize,
    leases: HashMap<StrategyId, u16>,
}

impl PortLedger {
    /// Create a ledger whose ceiling equals the pool size.
    pub fn new(base_port: u16, max_workers: usize) -> Self {
        let pool = PortPool::new(base_port, max_workers);
        let max_workers = pool.capacity();
        Self {
            pool,
            max_workers,
            leases: HashMap::new(),
        }
    }

    /// Lease a port for `strategy_id`.
    ///
    /// The ceiling is checked against the running count before the pool is
    /// consulted, so a free preferred port never bypasses it.
    ///
    /// # Errors
    /// - `AlreadyRunning` if the strategy already holds a lease.
    /// - `CapacityExceeded` when `running >= max_workers`.
    /// - `PortConflict` if the pool and the leases disagree.
    pub fn allocate(&mut self, strategy_id: StrategyId) -> Result<u16, OrchestratorError> {
        if let Some(&port) = self.leases.get(&strategy_id) {
            return Err(OrchestratorError::AlreadyRunning { strategy_id, port });
        }

        let running = self.leases.len();
        if running >= self.max_workers {
            return Err(OrchestratorError::CapacityExceeded {
                running,
                max: self.max_workers,
            });
        }

        let Some(port) = self.pool.lease(strategy_id) else {
            error!(
                running,
                max = self.max_workers,
                "Port pool empty below the ceiling: pool invariant violated"
            );
            return Err(OrchestratorError::PortConflict {
                port: self.pool.base_port(),
                detail: format!("pool empty with {running}/{} running", self.max_workers),
            });
        };

        if let Some((&holder, _)) = self.leases.iter().find(|(_, p)| **p == port) {
            error!(
                port,
                holder,
                strategy_id,
                "Leased port already owned by another slot: pool invariant violated"
            );
            return Err(OrchestratorError::PortConflict {
                port,
                detail: format!("already leased to strategy {holder}"),
            });
        }

        self.leases.insert(strategy_id, port);
        Ok(port)
    }

    /// Return the strategy's port to the pool, then drop the lease.
    ///
    /// Idempotent: unknown strategies yield `None`.
    pub fn release(&mut self, strategy_id: StrategyId) -> Option<u16> {
        let port = *self.leases.get(&strategy_id)?;
        if !self.pool.restore(port) {
            error!(
                port,
                strategy_id,
                "Released port was already in the pool: pool invariant violated"
            );
        }
        self.leases.remove(&strategy_id);
        Some(port)
    }

    /// Port leased to a strategy.
    pub fn port_of(&self, strategy_id: StrategyId) -> Option<u16> {
        self.leases.get(&strategy_id).copied()
    }

    /// Active leases.
    pub fn running(&self) -> usize {
        self.leases.len()
    }

    /// Capacity ceiling.
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Borrow the underlying pool.
    pub const fn pool(&self) -> &PortPool {
        &self.pool
    }

    /// Snapshot of the leases sorted by strategy id.
    pub fn leases(&self) -> Vec<(StrategyId, u16)> {
        let mut leases: Vec<_> = self.leases.iter().map(|(s, p)| (*s, *p)).collect();
        leases.sort_unstable();
        leases
    }

    /// Current capacity figures.
    pub fn capacity_info(&self) -> CapacityInfo {
        CapacityInfo::new(self.max_workers, self.leases.len(), self.pool.len())
    }
}
