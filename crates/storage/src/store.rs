// SPDX-License-Identifier: MIT

//! The event store: durable persistence for the `workflows` and `events`
//! relations, backed by two append-only logs and a materialized in-memory
//! view built by replaying them on open.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ame_core::{Workflow, WorkflowEvent, WorkflowId, WorkflowStatus};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::wal::Wal;

/// Append-only persistence over the `workflows` and `events` relations.
///
/// All writes go through a WAL first (fsync before returning — invariant
/// E2) and then update the materialized view; all reads are served from
/// the materialized view.
pub struct Store {
    workflows_wal: parking_lot::Mutex<Wal<Workflow>>,
    events_wal: parking_lot::Mutex<Wal<WorkflowEvent>>,
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
    events: RwLock<HashMap<WorkflowId, Vec<WorkflowEvent>>>,
}

impl Store {
    /// Open (or create) the store's two log files under `data_dir`,
    /// replaying them to build the materialized view.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref();
        let workflows_wal: Wal<Workflow> = Wal::open(data_dir.join("workflows.wal"))?;
        let events_wal: Wal<WorkflowEvent> = Wal::open(data_dir.join("events.wal"))?;

        let mut workflows = HashMap::new();
        for entry in workflows_wal.read_all()? {
            workflows.insert(entry.record.id, entry.record);
        }

        let mut events: HashMap<WorkflowId, Vec<WorkflowEvent>> = HashMap::new();
        for entry in events_wal.read_all()? {
            events.entry(entry.record.workflow_id).or_default().push(entry.record);
        }
        for list in events.values_mut() {
            list.sort_by_key(|e| e.sequence);
        }

        info!(
            workflows = workflows.len(),
            events = events.values().map(Vec::len).sum::<usize>(),
            "replayed event store from disk"
        );

        Ok(Self {
            workflows_wal: parking_lot::Mutex::new(workflows_wal),
            events_wal: parking_lot::Mutex::new(events_wal),
            workflows: RwLock::new(workflows),
            events: RwLock::new(events),
        })
    }

    /// Insert a new workflow row (expected to be in `Pending` status).
    pub fn create_workflow(&self, workflow: Workflow) -> Result<(), StoreError> {
        self.workflows_wal.lock().append(&workflow)?;
        self.workflows.write().insert(workflow.id, workflow);
        Ok(())
    }

    /// Transition a workflow's status, stamping `completed_at` as the
    /// caller directs (the caller is responsible for passing `Some(now)`
    /// for a terminal `status`, `None` otherwise).
    ///
    /// The check against `WorkflowStatus::can_transition_to` and the write
    /// happen under the same write-lock acquisition, so this is the single
    /// atomic commit point for a workflow's status: two racing callers
    /// (say, `approve_workflow` and a health-checker `cancel_workflow`)
    /// cannot both observe a pre-transition status and both succeed. The
    /// loser gets `StoreError::InvalidTransition` instead of silently
    /// clobbering the winner's terminal state.
    pub fn update_status(
        &self,
        id: WorkflowId,
        status: WorkflowStatus,
        failure_reason: Option<String>,
        completed_at: Option<u64>,
    ) -> Result<Workflow, StoreError> {
        let updated = {
            let mut guard = self.workflows.write();
            let workflow = guard.get_mut(&id).ok_or_else(|| {
                StoreError::Corrupt(format!("update_status: unknown workflow {id}"))
            })?;
            if !workflow.status.can_transition_to(status) {
                return Err(StoreError::InvalidTransition { id, from: workflow.status, to: status });
            }
            workflow.status = status;
            if failure_reason.is_some() {
                workflow.failure_reason = failure_reason;
            }
            workflow.completed_at = completed_at;
            workflow.clone()
        };
        self.workflows_wal.lock().append(&updated)?;
        Ok(updated)
    }

    pub fn get_workflow(&self, id: WorkflowId) -> Option<Workflow> {
        self.workflows.read().get(&id).cloned()
    }

    /// All workflows in a non-terminal status.
    pub fn list_active(&self) -> Vec<Workflow> {
        self.workflows.read().values().filter(|w| w.is_active()).cloned().collect()
    }

    /// The non-terminal workflow for `path`, if any. The persistent store
    /// is the single source of truth: this never consults the orchestrator's in-memory
    /// active-task map.
    pub fn find_active_by_worktree(&self, path: &Path) -> Option<Workflow> {
        self.workflows.read().values().find(|w| w.is_active() && w.worktree_path == path).cloned()
    }

    /// Append one event record. Durable before returning (E2); the bus
    /// broadcast that follows is the caller's responsibility, not this
    /// store's.
    pub fn save_event(&self, event: WorkflowEvent) -> Result<(), StoreError> {
        self.events_wal.lock().append(&event)?;
        self.events.write().entry(event.workflow_id).or_default().push(event);
        Ok(())
    }

    /// Highest persisted sequence for `workflow_id`, or 0 if none.
    pub fn max_event_sequence(&self, workflow_id: WorkflowId) -> u64 {
        self.events.read().get(&workflow_id).and_then(|v| v.last()).map(|e| e.sequence).unwrap_or(0)
    }

    /// All events for `workflow_id`, in sequence order.
    pub fn events_for(&self, workflow_id: WorkflowId) -> Vec<WorkflowEvent> {
        self.events.read().get(&workflow_id).cloned().unwrap_or_default()
    }

    /// Delete events whose workflow is terminal and finished before
    /// `cutoff` (epoch ms). Compacts both the in-memory view and the
    /// on-disk log. Returns the number of events deleted.
    pub fn prune_events_before(&self, cutoff: u64) -> Result<usize, StoreError> {
        let workflows = self.workflows.read();
        let prunable_workflow = |id: &WorkflowId| -> bool {
            workflows
                .get(id)
                .map(|w| w.status.is_terminal() && w.completed_at.is_some_and(|c| c < cutoff))
                .unwrap_or(false)
        };

        let mut deleted = 0usize;
        let mut survivors_by_workflow: HashMap<WorkflowId, Vec<WorkflowEvent>> = HashMap::new();
        {
            let events = self.events.read();
            for (id, list) in events.iter() {
                if prunable_workflow(id) {
                    deleted += list.len();
                } else {
                    survivors_by_workflow.insert(*id, list.clone());
                }
            }
        }
        drop(workflows);

        if deleted > 0 {
            let mut flat: Vec<WorkflowEvent> = survivors_by_workflow.values().flatten().cloned().collect();
            flat.sort_by(|a, b| a.workflow_id.as_str().cmp(b.workflow_id.as_str()).then(a.sequence.cmp(&b.sequence)));
            self.events_wal.lock().rewrite(flat)?;
            *self.events.write() = survivors_by_workflow;
            warn!(deleted, cutoff, "pruned retention-expired events");
        }
        Ok(deleted)
    }

    /// Delete finished workflows that completed before `cutoff` (epoch ms)
    /// and no longer have any events (either because they never emitted
    /// one, or `prune_events_before` just removed the last of them).
    /// Returns the number deleted.
    pub fn prune_orphan_workflows(&self, cutoff: u64) -> Result<usize, StoreError> {
        let orphan_ids: Vec<WorkflowId> = {
            let workflows = self.workflows.read();
            let events = self.events.read();
            workflows
                .values()
                .filter(|w| {
                    w.status.is_terminal()
                        && w.completed_at.is_some_and(|c| c < cutoff)
                        && events.get(&w.id).map(Vec::is_empty).unwrap_or(true)
                })
                .map(|w| w.id)
                .collect()
        };
        if orphan_ids.is_empty() {
            return Ok(0);
        }

        let mut workflows = self.workflows.write();
        for id in &orphan_ids {
            workflows.remove(id);
        }
        let survivors: Vec<Workflow> = workflows.values().cloned().collect();
        drop(workflows);
        self.workflows_wal.lock().rewrite(survivors)?;
        warn!(count = orphan_ids.len(), "pruned orphaned finished workflows");
        Ok(orphan_ids.len())
    }

    pub fn data_dir_exists(dir: impl AsRef<Path>) -> bool {
        dir.as_ref().is_dir()
    }
}

/// Convenience for constructing a [`Store`] rooted at a `PathBuf` the
/// caller already validated/created.
pub fn open(data_dir: PathBuf) -> Result<Store, StoreError> {
    Store::open(data_dir)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
