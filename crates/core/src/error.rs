// SPDX-License-Identifier: MIT

//! Error taxonomy for the orchestrator.

use crate::workflow::{WorkflowId, WorkflowStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Errors the orchestrator surfaces to callers (HTTP layer, CLI, runner).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// `startWorkflow` on a worktree that already has a non-terminal workflow.
    #[error("worktree {worktree_path:?} already has an active workflow ({existing})")]
    WorkflowConflict { worktree_path: PathBuf, existing: WorkflowId },

    /// `startWorkflow` when at `max_concurrent`.
    #[error("concurrency limit reached ({limit} active workflows)")]
    ConcurrencyLimit { limit: usize },

    /// approve/reject for an id the store has no record of.
    #[error("workflow {0} not found")]
    WorkflowNotFound(WorkflowId),

    /// Internal: a status update attempted a disallowed transition.
    #[error("workflow {id}: cannot transition from {from} to {to}")]
    InvalidTransition { id: WorkflowId, from: WorkflowStatus, to: WorkflowStatus },

    /// Any event-store error, surfaced up the call chain.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The server is draining; no new workflows are admitted.
    #[error("server is shutting down")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_conflict_message_carries_path() {
        let err = OrchestratorError::WorkflowConflict {
            worktree_path: PathBuf::from("/tmp/wt1"),
            existing: WorkflowId::new(),
        };
        assert!(err.to_string().contains("/tmp/wt1"));
    }

    #[test]
    fn concurrency_limit_message_carries_limit() {
        let err = OrchestratorError::ConcurrencyLimit { limit: 5 };
        assert!(err.to_string().contains('5'));
    }
}
