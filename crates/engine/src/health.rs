// SPDX-License-Identifier: MIT

//! Background worktree health checking: periodically verify every active
//! workflow's worktree still exists on disk, cancelling any workflow
//! whose worktree has vanished out from under it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ame_core::Clock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::orchestrator::Orchestrator;

/// Drives one periodic sweep over `Orchestrator::get_active_workflows`.
/// A single pass per tick.
pub struct HealthChecker {
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self { handle: std::sync::Mutex::new(None), running: Arc::new(AtomicBool::new(false)) }
    }

    /// Spawn the background loop. A second call while already running is a
    /// no-op.
    pub fn start<C: Clock + 'static>(
        &self,
        orchestrator: Arc<Orchestrator<C>>,
        interval: Duration,
        check_timeout: Duration,
    ) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let running = self.running.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                sweep(&orchestrator, check_timeout).await;
            }
        });
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Stop the background loop and wait for the in-flight sweep to finish.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

async fn sweep<C: Clock>(orchestrator: &Arc<Orchestrator<C>>, check_timeout: Duration) {
    let worktrees = orchestrator.get_active_workflows();
    for worktree_path in worktrees {
        let path_for_check = worktree_path.clone();
        let check = tokio::task::spawn_blocking(move || worktree_is_healthy(&path_for_check));
        let healthy = match tokio::time::timeout(check_timeout, check).await {
            Ok(Ok(healthy)) => healthy,
            Ok(Err(e)) => {
                warn!(worktree = %worktree_path.display(), error = %e, "health check task panicked");
                continue;
            }
            Err(_) => {
                warn!(worktree = %worktree_path.display(), "health check timed out");
                continue;
            }
        };

        if healthy {
            continue;
        }

        let Some(workflow) = orchestrator.get_workflow_by_worktree(&worktree_path) else { continue };
        info!(workflow_id = %workflow.id, worktree = %worktree_path.display(), "worktree missing, cancelling workflow");
        orchestrator
            .cancel_workflow(workflow.id, Some("Worktree directory no longer exists".to_string()))
            .await;
    }
}

fn worktree_is_healthy(path: &std::path::Path) -> bool {
    path.is_dir() && path.join(".git").exists()
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
