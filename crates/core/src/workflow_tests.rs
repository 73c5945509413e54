// SPDX-License-Identifier: MIT

use super::*;

fn wf(status: WorkflowStatus) -> Workflow {
    let mut w = Workflow::new(
        WorkflowId::new(),
        "ISSUE-1".into(),
        PathBuf::from("/tmp/wt"),
        "wt".into(),
        None,
        1,
    );
    w.status = status;
    w
}

#[test]
fn new_workflow_starts_pending_with_no_completion() {
    let w = wf(WorkflowStatus::Pending);
    assert_eq!(w.status, WorkflowStatus::Pending);
    assert!(w.completed_at.is_none());
    assert!(w.is_active());
}

#[test]
fn terminal_statuses_are_terminal() {
    assert!(WorkflowStatus::Completed.is_terminal());
    assert!(WorkflowStatus::Failed.is_terminal());
    assert!(WorkflowStatus::Cancelled.is_terminal());
    assert!(!WorkflowStatus::Pending.is_terminal());
    assert!(!WorkflowStatus::InProgress.is_terminal());
    assert!(!WorkflowStatus::Blocked.is_terminal());
}

#[test]
fn pending_can_move_to_in_progress_or_any_terminal() {
    assert!(WorkflowStatus::Pending.can_transition_to(WorkflowStatus::InProgress));
    assert!(WorkflowStatus::Pending.can_transition_to(WorkflowStatus::Cancelled));
    assert!(WorkflowStatus::Pending.can_transition_to(WorkflowStatus::Failed));
    assert!(!WorkflowStatus::Pending.can_transition_to(WorkflowStatus::Blocked));
}

#[test]
fn in_progress_can_move_to_blocked_and_back() {
    assert!(WorkflowStatus::InProgress.can_transition_to(WorkflowStatus::Blocked));
    assert!(WorkflowStatus::Blocked.can_transition_to(WorkflowStatus::InProgress));
}

#[test]
fn terminal_states_accept_no_further_transitions() {
    for terminal in [WorkflowStatus::Completed, WorkflowStatus::Failed, WorkflowStatus::Cancelled] {
        assert!(!terminal.can_transition_to(WorkflowStatus::InProgress));
        assert!(!terminal.can_transition_to(WorkflowStatus::Cancelled));
    }
}

#[test]
fn no_transition_to_self() {
    assert!(!WorkflowStatus::InProgress.can_transition_to(WorkflowStatus::InProgress));
}

#[test]
fn display_matches_wire_tags() {
    assert_eq!(WorkflowStatus::InProgress.to_string(), "in_progress");
    assert_eq!(WorkflowStatus::Cancelled.to_string(), "cancelled");
}
