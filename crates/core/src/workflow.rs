// SPDX-License-Identifier: MIT

//! Workflow identity and state machine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a workflow run.
    pub struct WorkflowId("wfl-");
}

/// Workflow status (ServerExecutionState.status).
///
/// Terminal states: `Completed`, `Failed`, `Cancelled`. The only
/// non-terminal-to-non-terminal transition allowed is `Pending`/`Blocked`
/// to `InProgress` and back (see [`WorkflowStatus::can_transition_to`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    Blocked,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    WorkflowStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Blocked => "blocked",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Invariant W3: transitions are monotonic toward a terminal state.
    /// The only non-terminal-to-non-terminal move is Pending/Blocked <-> InProgress.
    /// Cancel is allowed from any non-terminal state. `recoverInterruptedWorkflows`
    /// (any non-terminal -> Failed) is the one exception, applied directly by
    /// the orchestrator rather than through this check.
    pub fn can_transition_to(&self, next: Self) -> bool {
        if *self == next {
            return false;
        }
        if self.is_terminal() {
            return false;
        }
        match (*self, next) {
            (Self::Pending, Self::InProgress)
            | (Self::Blocked, Self::InProgress)
            | (Self::InProgress, Self::Blocked) => true,
            (_, Self::Completed) | (_, Self::Failed) | (_, Self::Cancelled) => true,
            _ => false,
        }
    }
}

/// A staged, possibly approval-gated execution against one worktree.
///
/// Invariant W1: `completed_at` is set iff `status` is terminal.
/// Invariant W2: at most one non-terminal workflow exists per `worktree_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub issue_id: String,
    pub worktree_path: PathBuf,
    pub worktree_name: String,
    pub profile: Option<String>,
    pub status: WorkflowStatus,
    pub started_at: u64,
    pub completed_at: Option<u64>,
    pub failure_reason: Option<String>,
}

impl Workflow {
    pub fn new(
        id: WorkflowId,
        issue_id: String,
        worktree_path: PathBuf,
        worktree_name: String,
        profile: Option<String>,
        started_at: u64,
    ) -> Self {
        Self {
            id,
            issue_id,
            worktree_path,
            worktree_name,
            profile,
            status: WorkflowStatus::Pending,
            started_at,
            completed_at: None,
            failure_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
