// SPDX-License-Identifier: MIT

use ame_core::WorkflowStatus;
use thiserror::Error;

/// Event-store failures. Every write-path variant propagates up to the
/// orchestrator as a `PersistenceFailure`: the sequence counter
/// is rolled back and the event is never broadcast.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt log entry: {0}")]
    Corrupt(String),

    /// `update_status` rejected a transition away from an already-terminal
    /// status. Raised inside the write lock, so it is the caller's
    /// authoritative answer to "did I win the race" rather than advisory.
    #[error("workflow {id} cannot transition from {from} to {to}")]
    InvalidTransition { id: ame_core::WorkflowId, from: WorkflowStatus, to: WorkflowStatus },
}
