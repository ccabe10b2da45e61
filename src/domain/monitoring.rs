//! Monitoring snapshots and threshold alerting.
//!
//! Alerts are edge-triggered: a metric raises once when it crosses its
//! threshold and re-arms only after falling back under it.

use std::collections::HashSet;

use serde::Serialize;

use super::capacity::CapacityInfo;

/// Host resource usage, all values in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SystemMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

/// Snapshot pushed on the monitoring topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringSnapshot {
    /// Host usage.
    pub system: SystemMetrics,
    /// Orchestrator capacity at sample time.
    pub capacity: CapacityInfo,
    /// Observers currently connected.
    pub connections: usize,
}

/// Metric an alert was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Capacity,
    Cpu,
    Memory,
    Disk,
}

impl AlertKind {
    /// Event type used in the alert envelope.
    pub const fn event_type(self) -> &'static str {
        match self {
            Self::Capacity => "capacity_alert",
            Self::Cpu => "cpu_alert",
            Self::Memory => "memory_alert",
            Self::Disk => "disk_alert",
        }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Warning,
    Critical,
}

/// A threshold crossing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemAlert {
    pub kind: AlertKind,
    pub level: AlertLevel,
    pub message: String,
    /// Observed value in percent.
    pub value: f64,
    /// Configured threshold in percent.
    pub threshold: f64,
}

/// Threshold set, all in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    pub capacity_percent: f64,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

/// Rising-edge detector over the four alert metrics.
#[derive(Debug, Default)]
pub struct AlertLatch {
    raised: HashSet<AlertKind>,
}

impl AlertLatch {
    /// Create a latch with nothing raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate a sample and return alerts that newly crossed their threshold.
    pub fn evaluate(
        &mut self,
        thresholds: &AlertThresholds,
        system: &SystemMetrics,
        capacity: &CapacityInfo,
    ) -> Vec<SystemAlert> {
        let readings = [
            (AlertKind::Capacity, capacity.utilization_percent, thresholds.capacity_percent),
            (AlertKind::Cpu, system.cpu_percent, thresholds.cpu_percent),
            (AlertKind::Memory, system.memory_percent, thresholds.memory_percent),
            (AlertKind::Disk, system.disk_percent, thresholds.disk_percent),
        ];

        let mut alerts = Vec::new();
        for (kind, value, threshold) in readings {
            if value >= threshold {
                if self.raised.insert(kind) {
                    alerts.push(build_alert(kind, value, threshold));
                }
            } else {
                self.raised.remove(&kind);
            }
        }
        alerts
    }

    /// Whether an alert for `kind` is currently latched.
    pub fn is_raised(&self, kind: AlertKind) -> bool {
        self.raised.contains(&kind)
    }
}

fn build_alert(kind: AlertKind, value: f64, threshold: f64) -> SystemAlert {
    // Critical once the metric is within 5 points of saturation.
    let level = if value >= 95.0 {
        AlertLevel::Critical
    } else {
        AlertLevel::Warning
    };

    let label = match kind {
        AlertKind::Capacity => "Worker capacity utilization",
        AlertKind::Cpu => "CPU usage",
        AlertKind::Memory => "Memory usage",
        AlertKind::Disk => "Disk usage",
    };

    SystemAlert {
        kind,
        level,
        message: format!("{label} at {value:.1}% (threshold {threshold:.1}%)"),
        value,
        threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> AlertThresholds {
        AlertThresholds {
            capacity_percent: 80.0,
            cpu_percent: 90.0,
            memory_percent: 90.0,
            disk_percent: 90.0,
        }
    }

    fn quiet() -> SystemMetrics {
        SystemMetrics {
            cpu_percent: 10.0,
            memory_percent: 20.0,
            disk_percent: 30.0,
        }
    }

    #[test]
    fn test_no_alerts_under_thresholds() {
        let mut latch = AlertLatch::new();
        let alerts = latch.evaluate(&thresholds(), &quiet(), &CapacityInfo::new(10, 1, 9));
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_capacity_alert_rising_edge_only() {
        let mut latch = AlertLatch::new();
        let busy = CapacityInfo::new(10, 9, 1);

        let first = latch.evaluate(&thresholds(), &quiet(), &busy);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, AlertKind::Capacity);
        assert_eq!(first[0].level, AlertLevel::Warning);

        assert!(latch.evaluate(&thresholds(), &quiet(), &busy).is_empty());

        // Falls back under, then crosses again.
        latch.evaluate(&thresholds(), &quiet(), &CapacityInfo::new(10, 2, 8));
        assert!(!latch.is_raised(AlertKind::Capacity));
        assert_eq!(latch.evaluate(&thresholds(), &quiet(), &busy).len(), 1);
    }

    #[test]
    fn test_critical_level_near_saturation() {
        let mut latch = AlertLatch::new();
        let hot = SystemMetrics {
            cpu_percent: 99.0,
            ..quiet()
        };
        let alerts = latch.evaluate(&thresholds(), &hot, &CapacityInfo::new(10, 0, 10));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Cpu);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert!(alerts[0].message.contains("CPU usage"));
    }
}
