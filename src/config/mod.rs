//! Configuration Module - TOML-based Gateway Configuration
//!
//! Loads and validates configuration from `config.toml`. Every section
//! has serde defaults so a minimal file (or none at all, in tests) yields
//! a working gateway. Port range and capacity are fixed at startup; alert
//! thresholds follow hot reloads.

pub mod hot_reload;
pub mod loader;

use serde::{Deserialize, Serialize};

use crate::domain::monitoring::AlertThresholds;

/// Top-level gateway configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any task is spawned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
  /// Gateway identity and log level.
  #[serde(default)]
  pub gateway: GatewayConfig,
  /// Port pool and worker launch parameters.
  #[serde(default)]
  pub orchestrator: OrchestratorConfig,
  /// Connection liveness timing.
  #[serde(default)]
  pub heartbeat: HeartbeatConfig,
  /// Control/WebSocket and health listeners.
  #[serde(default)]
  pub server: ServerConfig,
  /// Alert thresholds and collection cadence.
  #[serde(default)]
  pub alerts: AlertConfig,
  /// Prometheus exporter.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Gateway identity configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
  /// Human-readable instance name.
  #[serde(default = "default_name")]
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

impl Default for GatewayConfig {
  fn default() -> Self {
    Self {
      name: default_name(),
      log_level: default_log_level(),
    }
  }
}

/// Worker orchestration configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
  /// First port of the worker range.
  #[serde(default = "default_base_port")]
  pub base_port: u16,
  /// Hard ceiling on concurrently running workers; also the pool size.
  #[serde(default = "default_max_workers")]
  pub max_workers: usize,
  /// Worker program and leading arguments.
  #[serde(default = "default_worker_command")]
  pub worker_command: Vec<String>,
  /// Grace period for a worker to exit after kill (milliseconds).
  #[serde(default = "default_stop_timeout")]
  pub stop_timeout_ms: u64,
  /// Exit polling period (seconds).
  #[serde(default = "default_reap_interval")]
  pub reap_interval_seconds: u64,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      base_port: default_base_port(),
      max_workers: default_max_workers(),
      worker_command: default_worker_command(),
      stop_timeout_ms: default_stop_timeout(),
      reap_interval_seconds: default_reap_interval(),
    }
  }
}

/// Heartbeat timing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
  /// Sweep period (seconds).
  #[serde(default = "default_check_interval")]
  pub check_interval_seconds: u64,
  /// Age at which a connection is evicted (seconds).
  #[serde(default = "default_heartbeat_timeout")]
  pub timeout_seconds: u64,
  /// Fraction of the timeout after which a ping is sent.
  #[serde(default = "default_ping_ratio")]
  pub ping_ratio: f64,
}

impl Default for HeartbeatConfig {
  fn default() -> Self {
    Self {
      check_interval_seconds: default_check_interval(),
      timeout_seconds: default_heartbeat_timeout(),
      ping_ratio: default_ping_ratio(),
    }
  }
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
  /// Control API and WebSocket bind address.
  #[serde(default = "default_bind_addr")]
  pub bind_address: String,
  /// Health check port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
  /// Outbound frames buffered per connection before it counts as dead.
  #[serde(default = "default_client_buffer")]
  pub client_buffer: usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind_address: default_bind_addr(),
      health_port: default_health_port(),
      client_buffer: default_client_buffer(),
    }
  }
}

/// Alerting configuration. All thresholds in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
  #[serde(default = "default_capacity_threshold")]
  pub capacity_percent: f64,
  #[serde(default = "default_resource_threshold")]
  pub cpu_percent: f64,
  #[serde(default = "default_resource_threshold")]
  pub memory_percent: f64,
  #[serde(default = "default_resource_threshold")]
  pub disk_percent: f64,
  /// Sampling period (seconds).
  #[serde(default = "default_collect_interval")]
  pub collect_interval_seconds: u64,
}

impl Default for AlertConfig {
  fn default() -> Self {
    Self {
      capacity_percent: default_capacity_threshold(),
      cpu_percent: default_resource_threshold(),
      memory_percent: default_resource_threshold(),
      disk_percent: default_resource_threshold(),
      collect_interval_seconds: default_collect_interval(),
    }
  }
}

impl AlertConfig {
  /// Threshold set for the alert latch.
  pub const fn thresholds(&self) -> AlertThresholds {
    AlertThresholds {
      capacity_percent: self.capacity_percent,
      cpu_percent: self.cpu_percent,
      memory_percent: self.memory_percent,
      disk_percent: self.disk_percent,
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics HTTP server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
    }
  }
}

// Default value functions for serde

fn default_name() -> String {
  "strategy-gateway".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_base_port() -> u16 {
  8081
}

fn default_max_workers() -> usize {
  1000
}

fn default_worker_command() -> Vec<String> {
  vec!["strategy-worker".to_string()]
}

fn default_stop_timeout() -> u64 {
  5000
}

fn default_reap_interval() -> u64 {
  5
}

fn default_check_interval() -> u64 {
  10
}

fn default_heartbeat_timeout() -> u64 {
  30
}

fn default_ping_ratio() -> f64 {
  0.7
}

fn default_bind_addr() -> String {
  "0.0.0.0:8000".to_string()
}

fn default_health_port() -> u16 {
  8080
}

fn default_client_buffer() -> usize {
  256
}

fn default_capacity_threshold() -> f64 {
  80.0
}

fn default_resource_threshold() -> f64 {
  90.0
}

fn default_collect_interval() -> u64 {
  15
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}
