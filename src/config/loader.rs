//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Arguments
/// * `path` - Path to the config.toml file
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    base_port = config.orchestrator.base_port,
    max_workers = config.orchestrator.max_workers,
    heartbeat_timeout_s = config.heartbeat.timeout_seconds,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
///
/// # Errors
/// Returns error on malformed TOML or a failed validation rule.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content)
    .with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - A port range that fits below 65536
/// - Heartbeat ping point strictly inside the timeout
/// - Percent thresholds in (0, 100]
/// - A non-empty worker command
pub fn validate_config(config: &AppConfig) -> Result<()> {
  let orch = &config.orchestrator;

  // Orchestrator validation
  anyhow::ensure!(orch.max_workers > 0, "max_workers must be positive");
  anyhow::ensure!(orch.base_port > 0, "base_port must be positive");
  let last_port = u64::from(orch.base_port) + orch.max_workers as u64 - 1;
  anyhow::ensure!(
    last_port <= u64::from(u16::MAX),
    "Port range {}..={} exceeds 65535",
    orch.base_port,
    last_port
  );
  anyhow::ensure!(
    orch.worker_command.first().is_some_and(|program| !program.is_empty()),
    "worker_command must name a program"
  );
  anyhow::ensure!(orch.stop_timeout_ms > 0, "stop_timeout_ms must be positive");
  anyhow::ensure!(
    orch.reap_interval_seconds > 0,
    "reap_interval_seconds must be positive"
  );

  // Heartbeat validation
  let hb = &config.heartbeat;
  anyhow::ensure!(
    hb.check_interval_seconds > 0,
    "heartbeat check_interval_seconds must be positive"
  );
  anyhow::ensure!(
    hb.timeout_seconds > hb.check_interval_seconds,
    "heartbeat timeout ({}s) must exceed check interval ({}s)",
    hb.timeout_seconds,
    hb.check_interval_seconds
  );
  anyhow::ensure!(
    hb.ping_ratio > 0.0 && hb.ping_ratio < 1.0,
    "ping_ratio must be in (0, 1), got {}",
    hb.ping_ratio
  );

  // Server validation
  anyhow::ensure!(
    config.server.client_buffer > 0,
    "client_buffer must be positive"
  );

  // Alert validation
  let alerts = &config.alerts;
  for (name, value) in [
    ("capacity_percent", alerts.capacity_percent),
    ("cpu_percent", alerts.cpu_percent),
    ("memory_percent", alerts.memory_percent),
    ("disk_percent", alerts.disk_percent),
  ] {
    anyhow::ensure!(
      value > 0.0 && value <= 100.0,
      "alerts.{} must be in (0, 100], got {}",
      name,
      value
    );
  }
  anyhow::ensure!(
    alerts.collect_interval_seconds > 0,
    "collect_interval_seconds must be positive"
  );

  Ok(())
}
