// SPDX-License-Identifier: MIT

use super::*;
use crate::bus::EventBus;
use crate::orchestrator::Orchestrator;
use crate::runner::{RunnerContext, RunnerOutcome, WorkflowRunner};
use ame_core::FakeClock;
use ame_storage::Store;
use async_trait::async_trait;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn healthy_worktree_has_a_git_entry() {
    let dir = tempdir().unwrap();
    std::fs::create_dir(dir.path().join(".git")).unwrap();
    assert!(worktree_is_healthy(dir.path()));
}

#[test]
fn missing_directory_is_unhealthy() {
    assert!(!worktree_is_healthy(&PathBuf::from("/nonexistent/path/does/not/exist")));
}

#[test]
fn directory_without_git_entry_is_unhealthy() {
    let dir = tempdir().unwrap();
    assert!(!worktree_is_healthy(dir.path()));
}

struct HangingRunner;

#[async_trait]
impl WorkflowRunner<FakeClock> for HangingRunner {
    async fn run(&self, ctx: RunnerContext<FakeClock>) -> RunnerOutcome {
        ctx.cancellation_token().cancelled().await;
        RunnerOutcome::Failed("cancelled".to_string())
    }
}

#[tokio::test]
async fn sweep_cancels_workflow_whose_worktree_disappeared() {
    let worktree = tempdir().unwrap();
    let data_dir = tempdir().unwrap();
    std::fs::create_dir(worktree.path().join(".git")).unwrap();

    let store = Arc::new(Store::open(data_dir.path()).unwrap());
    let orch = Orchestrator::with_clock(store, EventBus::new(), 4, FakeClock::new());

    let id = orch
        .start_workflow(
            "issue-1".into(),
            worktree.path().to_path_buf(),
            "wt".into(),
            None,
            Arc::new(HangingRunner),
        )
        .await
        .unwrap();

    // Still healthy: no cancellation.
    sweep(&orch, Duration::from_secs(1)).await;
    assert!(!orch.store().get_workflow(id).unwrap().status.is_terminal());

    drop(worktree); // removes the directory and its .git entry

    sweep(&orch, Duration::from_secs(1)).await;
    orch.cancel_all_workflows(Duration::from_secs(1)).await;

    let workflow = orch.store().get_workflow(id).unwrap();
    assert_eq!(workflow.status, ame_core::WorkflowStatus::Cancelled);
}

#[tokio::test]
async fn start_is_idempotent_while_running() {
    let data_dir = tempdir().unwrap();
    let store = Arc::new(Store::open(data_dir.path()).unwrap());
    let orch = Orchestrator::with_clock(store, EventBus::new(), 4, FakeClock::new());

    let checker = HealthChecker::new();
    checker.start(orch.clone(), Duration::from_millis(10), Duration::from_millis(50));
    checker.start(orch.clone(), Duration::from_millis(10), Duration::from_millis(50));
    checker.stop().await;
}
