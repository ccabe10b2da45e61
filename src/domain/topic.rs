//! Subscription topics.
//!
//! Topics are pre-declared partitions over client connections. The five
//! fixed topics always exist; per-strategy log topics are synthesized from
//! a strategy id and accepted without prior declaration.

use std::fmt;

use serde::{Serialize, Serializer};

/// Strategy identifier shared by the orchestrator and the push layer.
pub type StrategyId = u32;

/// A named partition of connections used for selective broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    /// Host and gateway monitoring snapshots.
    Monitoring,
    /// Strategy lifecycle transitions.
    Strategies,
    /// Trading signals emitted by strategies.
    Signals,
    /// Aggregated log lines from every worker.
    Logs,
    /// Orchestrator capacity snapshots.
    Capacity,
    /// Log lines of a single strategy (`strategy_<id>_logs`).
    StrategyLogs(StrategyId),
}

impl Topic {
    /// Topics that exist for the whole lifetime of the registry.
    pub const FIXED: [Self; 5] = [
        Self::Monitoring,
        Self::Strategies,
        Self::Signals,
        Self::Logs,
        Self::Capacity,
    ];

    /// Resolve a wire topic name.
    ///
    /// Returns `None` for anything outside the fixed set that is not a
    /// well-formed per-strategy log topic. Strategy ids must be written the
    /// way `name` writes them (no sign, no leading zeros), so every accepted
    /// name round-trips.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "monitoring" => Some(Self::Monitoring),
            "strategies" => Some(Self::Strategies),
            "signals" => Some(Self::Signals),
            "logs" => Some(Self::Logs),
            "capacity" => Some(Self::Capacity),
            other => other
                .strip_prefix("strategy_")
                .and_then(|rest| rest.strip_suffix("_logs"))
                .filter(|id| is_canonical_id(id))
                .and_then(|id| id.parse::<StrategyId>().ok())
                .map(Self::StrategyLogs),
        }
    }

    /// Wire name of the topic.
    pub fn name(&self) -> String {
        match self {
            Self::Monitoring => "monitoring".to_string(),
            Self::Strategies => "strategies".to_string(),
            Self::Signals => "signals".to_string(),
            Self::Logs => "logs".to_string(),
            Self::Capacity => "capacity".to_string(),
            Self::StrategyLogs(id) => format!("strategy_{id}_logs"),
        }
    }

    /// Whether this topic is synthesized per strategy.
    pub const fn is_dynamic(&self) -> bool {
        matches!(self, Self::StrategyLogs(_))
    }
}

/// Plain decimal digits, with no leading zero unless the id is `0`.
fn is_canonical_id(id: &str) -> bool {
    !id.is_empty()
        && id.bytes().all(|b| b.is_ascii_digit())
        && (id == "0" || !id.starts_with('0'))
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}
