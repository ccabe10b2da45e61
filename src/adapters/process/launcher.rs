//! `tokio::process` worker launcher.

use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::domain::topic::StrategyId;
use crate::ports::worker::{WorkerExit, WorkerLauncher, WorkerProcess};

/// Spawns `command` once per strategy.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    /// Program followed by its leading arguments.
    command: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(
        &self,
        strategy_id: StrategyId,
        port: u16,
    ) -> anyhow::Result<Box<dyn WorkerProcess>> {
        let (program, args) = self
            .command
            .split_first()
            .context("worker command is empty")?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg("--port")
            .arg(port.to_string())
            .arg("--strategy-id")
            .arg(strategy_id.to_string())
            .env("STRATEGY_ID", strategy_id.to_string())
            .env("WORKER_PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        info!(strategy_id, port, pid = ?child.id(), program = %program, "Worker process started");
        Ok(Box::new(ChildWorker {
            child,
            strategy_id,
        }))
    }
}

/// A running worker child process.
#[derive(Debug)]
pub struct ChildWorker {
    child: Child,
    strategy_id: StrategyId,
}

#[async_trait]
impl WorkerProcess for ChildWorker {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn terminate(&mut self, grace: Duration) -> anyhow::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }

        self.child
            .start_kill()
            .context("failed to signal worker")?;

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(strategy_id = self.strategy_id, status = ?status, "Worker exited");
                Ok(())
            }
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("failed waiting for worker exit")),
            Err(_) => {
                warn!(
                    strategy_id = self.strategy_id,
                    grace_ms = grace.as_millis() as u64,
                    "Worker did not exit within grace period"
                );
                anyhow::bail!("worker {} still running after kill", self.strategy_id)
            }
        }
    }

    fn try_exit(&mut self) -> anyhow::Result<Option<WorkerExit>> {
        let status = self.child.try_wait().context("failed to poll worker")?;
        Ok(status.map(|status| WorkerExit {
            success: status.success(),
            code: status.code(),
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_launch_and_terminate_sleep() {
        let launcher = ProcessLauncher::new(vec!["sh".to_string(), "-c".to_string(), "sleep 30".to_string()]);
        // `sh -c` treats the appended flags as positional parameters.
        let mut worker = launcher.launch(3, 18083).await.unwrap();
        assert!(worker.pid().is_some());
        assert_eq!(worker.try_exit().unwrap(), None);

        worker.terminate(Duration::from_secs(5)).await.unwrap();
        let exit = worker.try_exit().unwrap().unwrap();
        assert!(!exit.success);
    }

    #[tokio::test]
    async fn test_exit_status_reported() {
        let launcher = ProcessLauncher::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "test \"$WORKER_PORT\" = 18084 && exit 0 || exit 3".to_string(),
        ]);
        let mut worker = launcher.launch(4, 18084).await.unwrap();

        let exit = loop {
            if let Some(exit) = worker.try_exit().unwrap() {
                break exit;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        assert_eq!(exit, WorkerExit { success: true, code: Some(0) });
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let launcher = ProcessLauncher::new(vec!["/nonexistent/strategy-worker".to_string()]);
        assert!(launcher.launch(1, 18081).await.is_err());

        let empty = ProcessLauncher::new(Vec::new());
        assert!(empty.launch(1, 18081).await.is_err());
    }
}
