//! Property-Based Tests - Port Pool Invariants
//!
//! Uses `proptest` to drive the port ledger and the orchestrator through
//! random allocate/release sequences and checks the pool accounting
//! after every step.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use strategy_gateway::domain::port_pool::PortLedger;
use strategy_gateway::ports::worker::{WorkerExit, WorkerLauncher, WorkerProcess};
use strategy_gateway::usecases::orchestrator::ProcessOrchestrator;

#[derive(Debug, Clone)]
enum Op {
    Allocate(u32),
    Release(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u32..40).prop_map(Op::Allocate),
        (0u32..40).prop_map(Op::Release),
    ]
}

// ── Ledger Properties ───────────────────────────────────────

proptest! {
    /// Free ports plus leased ports always equal the configured capacity,
    /// and no port is leased twice.
    #[test]
    fn pool_plus_leases_is_capacity(
        base in 1024u16..60000,
        max in 1usize..25,
        ops in prop::collection::vec(op(), 0..200),
    ) {
        let mut ledger = PortLedger::new(base, max);
        let capacity = ledger.pool().capacity();

        for op in ops {
            match op {
                Op::Allocate(id) => { let _ = ledger.allocate(id); }
                Op::Release(id) => { let _ = ledger.release(id); }
            }

            let leases = ledger.leases();
            prop_assert_eq!(ledger.pool().len() + leases.len(), capacity);
            prop_assert!(leases.len() <= max);

            let mut seen = HashSet::new();
            for (_, port) in &leases {
                prop_assert!(seen.insert(*port), "port {} leased twice", port);
                prop_assert!(ledger.pool().in_range(*port));
                prop_assert!(!ledger.pool().contains(*port));
            }
        }
    }

    /// The fallback lease is always the smallest free port.
    #[test]
    fn fallback_is_smallest_free_port(
        max in 2usize..20,
        held in prop::collection::vec(0u32..20, 0..20),
    ) {
        // Strategy ids past the range have no preferred port.
        let mut ledger = PortLedger::new(10_000, max);
        for id in held {
            let _ = ledger.allocate(id);
        }
        let expected = ledger.pool().free_ports().first().copied();
        let outsider = u32::from(u16::MAX);
        match ledger.allocate(outsider) {
            Ok(port) => prop_assert_eq!(Some(port), expected),
            Err(_) => prop_assert!(expected.is_none() || ledger.running() >= max),
        }
    }

    /// Utilization is `running / max * 100` and never exceeds 100.
    #[test]
    fn utilization_matches_running(
        max in 1usize..50,
        n in 0usize..60,
    ) {
        let mut ledger = PortLedger::new(20_000, max);
        for id in 0..n {
            let _ = ledger.allocate(id as u32);
        }
        let info = ledger.capacity_info();
        prop_assert_eq!(info.running, n.min(max));
        prop_assert!(info.utilization_percent <= 100.0);
        prop_assert_eq!(info.can_start_more, info.running < max);
    }
}

// ── Orchestrator Properties ─────────────────────────────────

struct InertProcess;

#[async_trait::async_trait]
impl WorkerProcess for InertProcess {
    fn pid(&self) -> Option<u32> {
        None
    }

    async fn terminate(&mut self, _grace: Duration) -> anyhow::Result<()> {
        Ok(())
    }

    fn try_exit(&mut self) -> anyhow::Result<Option<WorkerExit>> {
        Ok(None)
    }
}

struct InertLauncher;

#[async_trait::async_trait]
impl WorkerLauncher for InertLauncher {
    async fn launch(&self, _id: u32, _port: u16) -> anyhow::Result<Box<dyn WorkerProcess>> {
        Ok(Box::new(InertProcess))
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After any start/stop sequence the orchestrator's capacity view
    /// agrees with its running worker list.
    #[test]
    fn orchestrator_capacity_consistent(
        max in 1usize..10,
        ops in prop::collection::vec(op(), 0..60),
    ) {
        let orchestrator = ProcessOrchestrator::with_range(
            Arc::new(InertLauncher),
            30_000,
            max,
            Duration::from_millis(1),
        );

        tokio_test::block_on(async {
            for op in ops {
                match op {
                    Op::Allocate(id) => { let _ = orchestrator.start(id).await; }
                    Op::Release(id) => { orchestrator.stop(id).await; }
                }
            }
        });

        let (info, workers) = tokio_test::block_on(async {
            (orchestrator.capacity_info().await, orchestrator.running_workers().await)
        });
        prop_assert_eq!(info.running, workers.len());
        prop_assert_eq!(info.available + info.running, max);
        let ports: HashSet<u16> = workers.iter().map(|w| w.port).collect();
        prop_assert_eq!(ports.len(), workers.len());
    }
}
