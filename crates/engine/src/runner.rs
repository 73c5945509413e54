// SPDX-License-Identifier: MIT

//! The runner contract: an opaque unit of work, external to this crate,
//! that drives a workflow through its stages. The actual agent calls,
//! shell execution, and file writes are out of scope here — only the
//! boundary the runner calls back through is defined.

use std::sync::Arc;

use ame_core::{Clock, EventType, OrchestratorError, SystemClock, WorkflowId};
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{ApprovalOutcome, Orchestrator};

/// How a runner's `run` call ended.
#[derive(Debug, Clone)]
pub enum RunnerOutcome {
    Completed,
    Failed(String),
}

/// Implemented by the (external) agentic execution body. Must call
/// [`RunnerContext::emit`] for every externally visible step, call
/// [`RunnerContext::await_approval`] whenever a human decision is
/// required, and check [`RunnerContext::is_cancelled`] at every
/// suspension point.
#[async_trait]
pub trait WorkflowRunner<C: Clock = SystemClock>: Send + Sync {
    async fn run(&self, ctx: RunnerContext<C>) -> RunnerOutcome;
}

/// Handle a runner uses to call back into the orchestrator for one
/// workflow. Bound to a single `workflow_id` and its cancellation token.
pub struct RunnerContext<C: Clock = SystemClock> {
    pub(crate) workflow_id: WorkflowId,
    pub(crate) orchestrator: Arc<Orchestrator<C>>,
    pub(crate) cancel: CancellationToken,
}

impl<C: Clock> RunnerContext<C> {
    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    /// Persist and broadcast one event for this workflow.
    pub async fn emit(
        &self,
        agent: &str,
        event_type: EventType,
        message: impl Into<String> + Send,
        data: Option<Value>,
        correlation_id: Option<String>,
    ) -> Result<(), OrchestratorError> {
        self.orchestrator.emit(self.workflow_id, agent, event_type, message, data, correlation_id).await
    }

    /// Block until a human approves, rejects, or this workflow is
    /// cancelled/the process shuts down.
    pub async fn await_approval(&self) -> ApprovalOutcome {
        self.orchestrator.await_approval(self.workflow_id, &self.cancel).await
    }

    /// Cooperative cancellation check; the runner must consult this at
    /// every suspension point.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
