// SPDX-License-Identifier: MIT

use super::*;
use ame_core::{EventId, EventType, WorkflowId};
use std::path::PathBuf;
use tempfile::tempdir;

fn workflow(path: &str) -> Workflow {
    Workflow::new(WorkflowId::new(), "ISSUE-1".into(), PathBuf::from(path), "wt".into(), None, 1)
}

fn event(workflow_id: WorkflowId, seq: u64) -> WorkflowEvent {
    WorkflowEvent {
        id: EventId::new(),
        workflow_id,
        sequence: seq,
        timestamp: seq,
        agent: "system".into(),
        event_type: EventType::FileCreated,
        message: format!("event {seq}"),
        data: None,
        correlation_id: None,
    }
}

#[test]
fn create_and_get_workflow_round_trips() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let w = workflow("/tmp/wt1");
    store.create_workflow(w.clone()).unwrap();
    let got = store.get_workflow(w.id).unwrap();
    assert_eq!(got.id, w.id);
    assert_eq!(got.status, WorkflowStatus::Pending);
}

#[test]
fn update_status_stamps_completion_and_failure_reason() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let w = workflow("/tmp/wt1");
    store.create_workflow(w.clone()).unwrap();

    let updated =
        store.update_status(w.id, WorkflowStatus::Failed, Some("boom".into()), Some(99)).unwrap();
    assert_eq!(updated.status, WorkflowStatus::Failed);
    assert_eq!(updated.completed_at, Some(99));
    assert_eq!(updated.failure_reason.as_deref(), Some("boom"));
}

#[test]
fn update_status_rejects_transition_away_from_terminal() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let w = workflow("/tmp/wt1");
    store.create_workflow(w.clone()).unwrap();
    store.update_status(w.id, WorkflowStatus::Cancelled, None, Some(10)).unwrap();

    let result = store.update_status(w.id, WorkflowStatus::InProgress, None, None);
    assert!(matches!(
        result,
        Err(StoreError::InvalidTransition {
            from: WorkflowStatus::Cancelled,
            to: WorkflowStatus::InProgress,
            ..
        })
    ));
    assert_eq!(store.get_workflow(w.id).unwrap().status, WorkflowStatus::Cancelled);
}

#[test]
fn list_active_excludes_terminal_workflows() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let a = workflow("/tmp/a");
    let b = workflow("/tmp/b");
    store.create_workflow(a.clone()).unwrap();
    store.create_workflow(b.clone()).unwrap();
    store.update_status(b.id, WorkflowStatus::Completed, None, Some(10)).unwrap();

    let active = store.list_active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, a.id);
}

#[test]
fn find_active_by_worktree_ignores_terminal() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let w = workflow("/tmp/wt1");
    store.create_workflow(w.clone()).unwrap();
    assert!(store.find_active_by_worktree(Path::new("/tmp/wt1")).is_some());

    store.update_status(w.id, WorkflowStatus::Cancelled, None, Some(5)).unwrap();
    assert!(store.find_active_by_worktree(Path::new("/tmp/wt1")).is_none());
}

#[test]
fn save_event_and_max_sequence() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let w = workflow("/tmp/wt1");
    store.create_workflow(w.clone()).unwrap();
    assert_eq!(store.max_event_sequence(w.id), 0);

    store.save_event(event(w.id, 1)).unwrap();
    store.save_event(event(w.id, 2)).unwrap();
    assert_eq!(store.max_event_sequence(w.id), 2);
    assert_eq!(store.events_for(w.id).len(), 2);
}

#[test]
fn reopen_replays_workflows_and_events() {
    let dir = tempdir().unwrap();
    let w = workflow("/tmp/wt1");
    {
        let store = Store::open(dir.path()).unwrap();
        store.create_workflow(w.clone()).unwrap();
        store.save_event(event(w.id, 1)).unwrap();
        store.update_status(w.id, WorkflowStatus::Completed, None, Some(42)).unwrap();
    }

    let store = Store::open(dir.path()).unwrap();
    let got = store.get_workflow(w.id).unwrap();
    assert_eq!(got.status, WorkflowStatus::Completed);
    assert_eq!(store.events_for(w.id).len(), 1);
}

#[test]
fn prune_events_before_removes_only_old_terminal_workflow_events() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let old = workflow("/tmp/old");
    store.create_workflow(old.clone()).unwrap();
    store.save_event(event(old.id, 1)).unwrap();
    store.update_status(old.id, WorkflowStatus::Completed, None, Some(10)).unwrap();

    let recent = workflow("/tmp/recent");
    store.create_workflow(recent.clone()).unwrap();
    store.save_event(event(recent.id, 1)).unwrap();
    store.update_status(recent.id, WorkflowStatus::Completed, None, Some(1_000)).unwrap();

    let active = workflow("/tmp/active");
    store.create_workflow(active.clone()).unwrap();
    store.save_event(event(active.id, 1)).unwrap();

    let deleted = store.prune_events_before(500).unwrap();
    assert_eq!(deleted, 1);
    assert!(store.events_for(old.id).is_empty());
    assert_eq!(store.events_for(recent.id).len(), 1);
    assert_eq!(store.events_for(active.id).len(), 1);
}

#[test]
fn prune_orphan_workflows_deletes_finished_workflows_without_events() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let w = workflow("/tmp/wt1");
    store.create_workflow(w.clone()).unwrap();
    store.update_status(w.id, WorkflowStatus::Cancelled, None, Some(1)).unwrap();

    let still_has_events = workflow("/tmp/wt2");
    store.create_workflow(still_has_events.clone()).unwrap();
    store.save_event(event(still_has_events.id, 1)).unwrap();
    store.update_status(still_has_events.id, WorkflowStatus::Cancelled, None, Some(1)).unwrap();

    let deleted = store.prune_orphan_workflows(1000).unwrap();
    assert_eq!(deleted, 1);
    assert!(store.get_workflow(w.id).is_none());
    assert!(store.get_workflow(still_has_events.id).is_some());
}
