//! Config Hot-Reload - Watch config.toml for Changes Every 60s
//!
//! Periodically re-reads config.toml and compares with the current
//! config. If changes are detected, broadcasts the new config via
//! a `tokio::sync::watch` channel. The port range and worker ceiling
//! are fixed for the process lifetime, so the `[orchestrator]` section
//! of a reloaded file is ignored with a warning.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use super::AppConfig;

/// Default polling period.
pub const RELOAD_INTERVAL: Duration = Duration::from_secs(60);

/// Watches config.toml for changes and broadcasts updates.
///
/// Polls the config file (not a filesystem watcher, which has
/// portability issues across Linux/macOS/Docker volumes).
/// Compares a content hash to detect meaningful changes.
pub struct ConfigWatcher {
    /// Path to config.toml.
    config_path: String,
    /// Watch channel sender for config updates.
    config_tx: watch::Sender<AppConfig>,
    /// Last known file hash (for diff detection).
    last_hash: Option<u64>,
    /// Polling period.
    interval: Duration,
}

impl ConfigWatcher {
    /// Create a new config watcher.
    ///
    /// Returns the watcher and a watch::Receiver that consumers
    /// can use to get notified of config changes.
    pub fn new(
        config_path: &str,
        initial_config: AppConfig,
    ) -> (Self, watch::Receiver<AppConfig>) {
        let (config_tx, config_rx) = watch::channel(initial_config);

        let watcher = Self {
            config_path: config_path.to_string(),
            config_tx,
            last_hash: None,
            interval: RELOAD_INTERVAL,
        };

        (watcher, config_rx)
    }

    /// Override the polling period.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the config watcher loop until shutdown.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(
        &mut self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        info!(
            path = %self.config_path,
            interval_s = self.interval.as_secs(),
            "Config watcher started"
        );

        self.last_hash = self.compute_hash().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Config watcher shutting down");
                    return Ok(());
                }
                () = tokio::time::sleep(self.interval) => {
                    self.check_and_reload().await;
                }
            }
        }
    }

    /// Check if config has changed and reload if so.
    ///
    /// Returns whether a new config was published.
    pub async fn check_and_reload(&mut self) -> bool {
        let new_hash = self.compute_hash().await;

        if new_hash == self.last_hash {
            debug!("Config unchanged");
            return false;
        }

        info!("Config change detected, reloading...");

        match super::loader::load_config(&self.config_path) {
            Ok(mut new_config) => {
                self.last_hash = new_hash;
                let current = self.config_tx.borrow().orchestrator.clone();
                if new_config.orchestrator != current {
                    warn!("Orchestrator settings require a restart, keeping current values");
                    new_config.orchestrator = current;
                }
                self.config_tx.send_replace(new_config);
                info!("Config reloaded successfully");
                true
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to reload config: keeping current"
                );
                false
            }
        }
    }

    /// Compute a simple hash of the config file contents for diff detection.
    async fn compute_hash(&self) -> Option<u64> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let content = tokio::fs::read_to_string(&self.config_path)
            .await
            .ok()?;

        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Some(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(name: &str, content: &str) -> String {
        let path = std::env::temp_dir().join(format!(
            "gateway-reload-{}-{}.toml",
            name,
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_reload_publishes_thresholds_but_keeps_port_range() {
        let path = temp_config("thresholds", "[alerts]\ncpu_percent = 90.0\n");
        let (mut watcher, rx) = ConfigWatcher::new(&path, AppConfig::default());
        watcher.last_hash = watcher.compute_hash().await;

        assert!(!watcher.check_and_reload().await);

        std::fs::write(
            &path,
            "[alerts]\ncpu_percent = 55.0\n[orchestrator]\nbase_port = 30000\n",
        )
        .unwrap();
        assert!(watcher.check_and_reload().await);

        let current = rx.borrow().clone();
        assert_eq!(current.alerts.cpu_percent, 55.0);
        assert_eq!(current.orchestrator.base_port, 8081);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_invalid_reload_keeps_current() {
        let path = temp_config("invalid", "");
        let (mut watcher, rx) = ConfigWatcher::new(&path, AppConfig::default());
        watcher.last_hash = watcher.compute_hash().await;

        std::fs::write(&path, "[heartbeat]\nping_ratio = 3.0\n").unwrap();
        assert!(!watcher.check_and_reload().await);
        assert_eq!(*rx.borrow(), AppConfig::default());

        let _ = std::fs::remove_file(&path);
    }
}
