//! Host Metrics Adapter - `sysinfo` Sampler
//!
//! Implements `SystemMetricsSource`. The `System` handle is kept between
//! samples because CPU usage is a delta against the previous refresh.

use std::sync::{Arc, Mutex};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use sysinfo::{Disks, System};

use crate::domain::monitoring::SystemMetrics;
use crate::ports::system_metrics::SystemMetricsSource;

/// CPU, memory and aggregate disk usage of the local host.
pub struct SysinfoMetrics {
    system: Arc<Mutex<System>>,
}

impl SysinfoMetrics {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime the CPU counters so the first sample has a baseline.
        system.refresh_cpu_usage();
        Self {
            system: Arc::new(Mutex::new(system)),
        }
    }
}

impl Default for SysinfoMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemMetricsSource for SysinfoMetrics {
    async fn sample(&self) -> anyhow::Result<SystemMetrics> {
        let system = Arc::clone(&self.system);
        tokio::task::spawn_blocking(move || {
            let mut sys = system
                .lock()
                .map_err(|_| anyhow!("system sampler lock poisoned"))?;
            sys.refresh_cpu_usage();
            sys.refresh_memory();

            let disks = Disks::new_with_refreshed_list();
            let (total, available) = disks.list().iter().fold((0u64, 0u64), |(t, a), d| {
                (t + d.total_space(), a + d.available_space())
            });

            Ok::<_, anyhow::Error>(SystemMetrics {
                cpu_percent: f64::from(sys.global_cpu_usage()),
                memory_percent: percent(sys.used_memory(), sys.total_memory()),
                disk_percent: percent(total.saturating_sub(available), total),
            })
        })
        .await
        .context("system sampler task failed")?
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 / total as f64 * 100.0
}
