// SPDX-License-Identifier: MIT

//! The orchestrator: admission, the emit critical section, the approval
//! gate, cancellation, and the runner contract's other half.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ame_core::{
    Clock, EventId, EventType, OrchestratorError, SystemClock, Workflow, WorkflowEvent, WorkflowId,
    WorkflowStatus,
};
use ame_storage::Store;
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::EventBus;
use crate::runner::{RunnerContext, RunnerOutcome, WorkflowRunner};

/// Outcome delivered through the approval rendezvous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    Rejected(String),
}

/// Per-workflow sequence state guarded by the workflow's serializer.
struct SeqState {
    current: Option<u64>,
}

struct ActiveTask {
    workflow_id: WorkflowId,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

/// Owns the set of active runners, per-workflow sequence counters and
/// serializers, and the approval registry. Generic over the clock so tests
/// can drive time deterministically.
pub struct Orchestrator<C: Clock = SystemClock> {
    store: Arc<Store>,
    bus: EventBus,
    clock: C,
    max_concurrent: usize,
    /// Keyed by `worktree_path`: at most one active workflow per worktree,
    /// enforced entirely here.
    active: SyncMutex<HashMap<PathBuf, ActiveTask>>,
    /// Per-workflow serializer + cached sequence counter.
    seq_locks: SyncMutex<HashMap<WorkflowId, Arc<AsyncMutex<SeqState>>>>,
    /// The single global approval lock.
    approvals: SyncMutex<HashMap<WorkflowId, oneshot::Sender<ApprovalOutcome>>>,
    /// Set by lifecycle once draining has begun; checked first in
    /// `start_workflow` so admission is rejected rather than racing the
    /// shutdown drain.
    shutting_down: AtomicBool,
}

impl Orchestrator<SystemClock> {
    pub fn new(store: Arc<Store>, bus: EventBus, max_concurrent: usize) -> Arc<Self> {
        Self::with_clock(store, bus, max_concurrent, SystemClock)
    }
}

impl<C: Clock> Orchestrator<C> {
    pub fn with_clock(store: Arc<Store>, bus: EventBus, max_concurrent: usize, clock: C) -> Arc<Self> {
        Arc::new(Self {
            store,
            bus,
            clock,
            max_concurrent,
            active: SyncMutex::new(HashMap::new()),
            seq_locks: SyncMutex::new(HashMap::new()),
            approvals: SyncMutex::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Mark the orchestrator as draining. Called by lifecycle at the start
    /// of `shutdown()`; every subsequent `start_workflow` call fails with
    /// `ShuttingDown`.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Admission. Rejects while draining, then checks worktree uniqueness,
    /// then the global concurrency ceiling, in that order, before any side
    /// effect.
    pub async fn start_workflow(
        self: &Arc<Self>,
        issue_id: String,
        worktree_path: PathBuf,
        worktree_name: String,
        profile: Option<String>,
        runner: Arc<dyn WorkflowRunner<C>>,
    ) -> Result<WorkflowId, OrchestratorError> {
        if self.is_shutting_down() {
            return Err(OrchestratorError::ShuttingDown);
        }

        let id = WorkflowId::new();
        let cancel = CancellationToken::new();

        {
            let mut active = self.active.lock();
            if let Some(existing) = active.get(&worktree_path) {
                return Err(OrchestratorError::WorkflowConflict {
                    worktree_path,
                    existing: existing.workflow_id,
                });
            }
            if active.len() >= self.max_concurrent {
                return Err(OrchestratorError::ConcurrencyLimit { limit: self.max_concurrent });
            }
            active.insert(
                worktree_path.clone(),
                ActiveTask { workflow_id: id, cancel: cancel.clone(), join: None },
            );
        }

        let now = self.clock.epoch_ms();
        let workflow =
            Workflow::new(id, issue_id, worktree_path.clone(), worktree_name, profile, now);
        if let Err(e) = self.store.create_workflow(workflow) {
            self.active.lock().remove(&worktree_path);
            return Err(OrchestratorError::Persistence(e.to_string()));
        }

        let orchestrator = self.clone();
        let path_for_task = worktree_path.clone();
        let cancel_for_task = cancel.clone();
        let handle = tokio::spawn(async move {
            orchestrator.drive_runner(id, path_for_task, runner, cancel_for_task).await;
        });

        if let Some(task) = self.active.lock().get_mut(&worktree_path) {
            task.join = Some(handle);
        }

        info!(workflow_id = %id, worktree = %worktree_path.display(), "workflow started");
        Ok(id)
    }

    async fn drive_runner(
        self: Arc<Self>,
        id: WorkflowId,
        worktree_path: PathBuf,
        runner: Arc<dyn WorkflowRunner<C>>,
        cancel: CancellationToken,
    ) {
        if let Err(e) =
            self.emit(id, "system", EventType::WorkflowStarted, "workflow started", None, None).await
        {
            warn!(workflow_id = %id, error = %e, "failed to emit WorkflowStarted");
        }
        let _ = self.store.update_status(id, WorkflowStatus::InProgress, None, None);

        let ctx = RunnerContext { workflow_id: id, orchestrator: self.clone(), cancel: cancel.clone() };
        let outcome = runner.run(ctx).await;

        // A concurrent cancel/reject may already have written a terminal
        // status; never overwrite it.
        let already_terminal =
            self.store.get_workflow(id).map(|w| w.status.is_terminal()).unwrap_or(true);
        if !already_terminal {
            let now = self.clock.epoch_ms();
            match outcome {
                RunnerOutcome::Completed => {
                    let _ = self.store.update_status(id, WorkflowStatus::Completed, None, Some(now));
                    let _ = self
                        .emit(id, "system", EventType::WorkflowCompleted, "workflow completed", None, None)
                        .await;
                }
                RunnerOutcome::Failed(reason) => {
                    let _ = self.store.update_status(
                        id,
                        WorkflowStatus::Failed,
                        Some(reason.clone()),
                        Some(now),
                    );
                    let _ = self
                        .emit(id, "system", EventType::WorkflowFailed, reason, None, None)
                        .await;
                }
            }
        }

        self.active.lock().remove(&worktree_path);
        self.seq_locks.lock().remove(&id);
        self.approvals.lock().remove(&id);
    }

    /// The emit critical section. The serializer guards only
    /// sequence assignment + persistence; broadcast happens after release.
    pub async fn emit(
        &self,
        workflow_id: WorkflowId,
        agent: &str,
        event_type: EventType,
        message: impl Into<String>,
        data: Option<Value>,
        correlation_id: Option<String>,
    ) -> Result<(), OrchestratorError> {
        let message = message.into();
        let serializer = self.serializer_for(workflow_id);
        let mut state = serializer.lock().await;

        if state.current.is_none() {
            state.current = Some(self.store.max_event_sequence(workflow_id));
        }
        let next_seq = state.current.unwrap_or(0) + 1;

        let event = WorkflowEvent {
            id: EventId::new(),
            workflow_id,
            sequence: next_seq,
            timestamp: self.clock.epoch_ms(),
            agent: agent.to_string(),
            event_type,
            message,
            data,
            correlation_id,
        };

        match self.store.save_event(event.clone()) {
            Ok(()) => {
                state.current = Some(next_seq);
            }
            Err(e) => {
                // Rollback: leave `current` at its pre-increment value so the
                // next attempt reuses `next_seq` and the sequence stays gap-free.
                error!(workflow_id = %workflow_id, seq = next_seq, error = %e, "emit persistence failed");
                return Err(OrchestratorError::Persistence(e.to_string()));
            }
        }
        drop(state);

        self.bus.emit(&event);
        Ok(())
    }

    fn serializer_for(&self, workflow_id: WorkflowId) -> Arc<AsyncMutex<SeqState>> {
        self.seq_locks
            .lock()
            .entry(workflow_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(SeqState { current: None })))
            .clone()
    }

    /// Approval gate entry point for the runner.
    pub async fn await_approval(
        self: &Arc<Self>,
        workflow_id: WorkflowId,
        cancel: &CancellationToken,
    ) -> ApprovalOutcome {
        let (tx, rx) = oneshot::channel();
        {
            let mut approvals = self.approvals.lock();
            assert!(
                !approvals.contains_key(&workflow_id),
                "await_approval called with a slot already pending for {workflow_id}"
            );
            approvals.insert(workflow_id, tx);
        }

        let _ = self.store.update_status(workflow_id, WorkflowStatus::Blocked, None, None);
        if let Err(e) = self
            .emit(workflow_id, "system", EventType::ApprovalRequired, "awaiting approval", None, None)
            .await
        {
            warn!(workflow_id = %workflow_id, error = %e, "failed to emit ApprovalRequired");
        }

        let outcome = tokio::select! {
            res = rx => res.unwrap_or_else(|_| ApprovalOutcome::Rejected("approval slot dropped".into())),
            _ = cancel.cancelled() => ApprovalOutcome::Rejected("workflow cancelled".into()),
        };

        self.approvals.lock().remove(&workflow_id);
        outcome
    }

    /// Race-free: slot removal under the global approval lock is the
    /// commit point. Still guards the status write with
    /// `can_transition_to`: a concurrent `cancel_workflow` can reach
    /// the workflow's terminal state before this call acquires the slot,
    /// and the removed slot alone does not prove the workflow is still
    /// blocked.
    pub async fn approve_workflow(
        &self,
        workflow_id: WorkflowId,
        correlation_id: Option<String>,
    ) -> Result<bool, OrchestratorError> {
        let tx = self.approvals.lock().remove(&workflow_id);
        let Some(tx) = tx else { return Ok(false) };

        let Some(workflow) = self.store.get_workflow(workflow_id) else { return Ok(false) };
        if !workflow.status.can_transition_to(WorkflowStatus::InProgress) {
            warn!(
                workflow_id = %workflow_id,
                status = %workflow.status,
                "approve_workflow: workflow already reached a terminal state; dropping slot"
            );
            return Ok(false);
        }

        match self.store.update_status(workflow_id, WorkflowStatus::InProgress, None, None) {
            Ok(_) => {}
            Err(ame_storage::StoreError::InvalidTransition { from, to, .. }) => {
                warn!(
                    workflow_id = %workflow_id,
                    %from, %to,
                    "approve_workflow: lost the race to a concurrent terminal transition"
                );
                return Ok(false);
            }
            Err(e) => return Err(OrchestratorError::Persistence(e.to_string())),
        }
        self.emit(workflow_id, "system", EventType::ApprovalGranted, "approved", None, correlation_id)
            .await?;
        let _ = tx.send(ApprovalOutcome::Approved);
        Ok(true)
    }

    pub async fn reject_workflow(
        &self,
        workflow_id: WorkflowId,
        feedback: String,
    ) -> Result<bool, OrchestratorError> {
        let tx = self.approvals.lock().remove(&workflow_id);
        let Some(tx) = tx else { return Ok(false) };

        let Some(workflow) = self.store.get_workflow(workflow_id) else { return Ok(false) };
        if !workflow.status.can_transition_to(WorkflowStatus::Failed) {
            warn!(
                workflow_id = %workflow_id,
                status = %workflow.status,
                "reject_workflow: workflow already reached a terminal state; dropping slot"
            );
            return Ok(false);
        }

        let now = self.clock.epoch_ms();
        match self.store.update_status(workflow_id, WorkflowStatus::Failed, Some(feedback.clone()), Some(now)) {
            Ok(_) => {}
            Err(ame_storage::StoreError::InvalidTransition { from, to, .. }) => {
                warn!(
                    workflow_id = %workflow_id,
                    %from, %to,
                    "reject_workflow: lost the race to a concurrent terminal transition"
                );
                return Ok(false);
            }
            Err(e) => return Err(OrchestratorError::Persistence(e.to_string())),
        }
        self.emit(workflow_id, "system", EventType::ApprovalRejected, feedback.clone(), None, None)
            .await?;
        let _ = tx.send(ApprovalOutcome::Rejected(feedback));

        if let Some(cancel) = self.cancel_token_for(workflow_id) {
            cancel.cancel();
        }
        Ok(true)
    }

    /// Idempotent: unknown id or no active task is a no-op. Cancellation
    /// gets its own terminal status and event type, kept distinct from
    /// `reject_workflow`'s explicit `Failed` transition. The
    /// `WorkflowCancelled` event is routed through `emit` like every other
    /// event, so its sequence comes from the same per-workflow serializer
    /// a concurrent runner `emit` would be waiting on — no separate
    /// sequence computation that could collide with it.
    pub async fn cancel_workflow(&self, workflow_id: WorkflowId, reason: Option<String>) {
        let Some(workflow) = self.store.get_workflow(workflow_id) else {
            return;
        };
        let Some(cancel) = self.cancel_token_for(workflow_id) else { return };

        if !workflow.status.can_transition_to(WorkflowStatus::Cancelled) {
            return;
        }

        let now = self.clock.epoch_ms();
        if self
            .store
            .update_status(workflow_id, WorkflowStatus::Cancelled, reason.clone(), Some(now))
            .is_err()
        {
            return;
        }
        let message = reason.unwrap_or_else(|| "cancelled".to_string());
        if let Err(e) =
            self.emit(workflow_id, "system", EventType::WorkflowCancelled, message, None, None).await
        {
            warn!(workflow_id = %workflow_id, error = %e, "failed to emit WorkflowCancelled");
        }
        cancel.cancel();
    }

    fn cancel_token_for(&self, workflow_id: WorkflowId) -> Option<CancellationToken> {
        let workflow = self.store.get_workflow(workflow_id)?;
        let active = self.active.lock();
        active
            .get(&workflow.worktree_path)
            .filter(|t| t.workflow_id == workflow_id)
            .map(|t| t.cancel.clone())
    }

    pub fn get_active_workflows(&self) -> Vec<PathBuf> {
        self.active.lock().keys().cloned().collect()
    }

    /// Prefer the persistent store over the in-memory active-task map: a
    /// workflow can be persisted active with no in-memory task mid-startup,
    /// before `recover_interrupted_workflows` has run.
    pub fn get_workflow_by_worktree(&self, worktree_path: &std::path::Path) -> Option<Workflow> {
        self.store.find_active_by_worktree(worktree_path)
    }

    /// Cancel every active task and wait up to `timeout` per task; tasks
    /// that miss the deadline are abandoned.
    pub async fn cancel_all_workflows(&self, timeout: Duration) {
        let tasks: Vec<(PathBuf, CancellationToken, Option<JoinHandle<()>>)> = {
            let mut active = self.active.lock();
            active.drain().map(|(path, task)| (path, task.cancel, task.join)).collect()
        };

        for (path, cancel, join) in tasks {
            cancel.cancel();
            if let Some(handle) = join {
                if tokio::time::timeout(timeout, handle).await.is_err() {
                    warn!(worktree = %path.display(), "workflow task did not finish within shutdown timeout; abandoning");
                }
            }
        }
    }

    /// Startup recovery. The only allowed non-monotone-looking transition:
    /// any prior in-memory state is definitionally gone, so every
    /// non-terminal workflow becomes `failed`.
    pub fn recover_interrupted_workflows(&self) -> usize {
        let now = self.clock.epoch_ms();
        let mut recovered = 0usize;
        for workflow in self.store.list_active() {
            if self
                .store
                .update_status(
                    workflow.id,
                    WorkflowStatus::Failed,
                    Some("interrupted".to_string()),
                    Some(now),
                )
                .is_ok()
            {
                recovered += 1;
            }
        }
        if recovered > 0 {
            warn!(count = recovered, "marked interrupted workflows as failed on startup");
        }
        recovered
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
