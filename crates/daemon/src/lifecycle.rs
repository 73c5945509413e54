// SPDX-License-Identifier: MIT

//! Daemon startup and graceful shutdown: acquire the lock first, then
//! create directories, open the store (which replays its WALs), recover
//! interrupted workflows, and start the health checker — in that order,
//! so a lock-acquisition failure never disturbs a running daemon's files.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use ame_engine::{EventBus, HealthChecker, Orchestrator, RetentionCollector};
use ame_storage::Store;
use fs2::FileExt;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::DaemonError;

/// A running daemon: owns the lock file (released on drop), the
/// orchestrator, and the background health checker.
pub struct Daemon {
    config: Config,
    orchestrator: Arc<Orchestrator>,
    health: HealthChecker,
    _lock_file: std::fs::File,
}

impl Daemon {
    /// Acquire the single-instance lock, open the store (replaying its
    /// WALs), recover any workflows left non-terminal by a prior crash, and
    /// start the health checker.
    pub async fn start(config: Config) -> Result<Self, DaemonError> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| DaemonError::CreateDir(config.data_dir.clone(), e))?;

        let lock_path = config.data_dir.join("amelia.pid");
        let lock_file = OpenOptions::new().write(true).create(true).truncate(false).open(&lock_path)?;
        lock_file.try_lock_exclusive().map_err(DaemonError::LockFailed)?;
        let mut lock_file = lock_file;
        lock_file.set_len(0)?;
        writeln!(lock_file, "{}", std::process::id())?;

        let store = Arc::new(Store::open(&config.data_dir)?);
        let bus = EventBus::new();
        let orchestrator = Orchestrator::new(store, bus, config.max_concurrent);

        let recovered = orchestrator.recover_interrupted_workflows();
        if recovered > 0 {
            info!(count = recovered, "recovered interrupted workflows on startup");
        }

        let health = HealthChecker::new();
        health.start(orchestrator.clone(), config.health_check_interval, Duration::from_secs(5));

        info!(data_dir = %config.data_dir.display(), max_concurrent = config.max_concurrent, "daemon started");

        Ok(Self { config, orchestrator, health, _lock_file: lock_file })
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Drain active workflows, then run the retention sweep:
    /// poll `get_active_workflows` every 50ms up to `shutdown_timeout`,
    /// force-cancel whatever remains, stop the health checker, then prune.
    pub async fn shutdown(self) -> Result<(), DaemonError> {
        info!("shutting down");
        self.orchestrator.begin_shutdown();

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        while !self.orchestrator.get_active_workflows().is_empty() && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let remaining = self.orchestrator.get_active_workflows().len();
        if remaining > 0 {
            warn!(remaining, "forcibly cancelling workflows still active at shutdown deadline");
        }
        self.orchestrator.cancel_all_workflows(Duration::from_secs(5)).await;

        self.health.stop().await;

        let collector = RetentionCollector::new(ame_core::SystemClock, self.config.retention_days);
        let (events_deleted, workflows_deleted) = collector.cleanup_on_shutdown(self.orchestrator.store())?;
        info!(events_deleted, workflows_deleted, "retention sweep complete");

        info!("shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
