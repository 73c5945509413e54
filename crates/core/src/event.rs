// SPDX-License-Identifier: MIT

//! Workflow event taxonomy and the durable event record.

use crate::workflow::WorkflowId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a workflow event.
    pub struct EventId("evt-");
}

/// Fixed enumeration of event tags the core emits or recognizes.
///
/// Runners may emit additional tags; those round-trip through [`Other`](EventType::Other)
/// and are treated as opaque by the core. Serialized as a plain snake_case string so an
/// unrecognized tag on the wire survives a round trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    WorkflowStarted,
    StageStarted,
    StageCompleted,
    StageFailed,
    ApprovalRequired,
    ApprovalGranted,
    ApprovalRejected,
    FileCreated,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
    /// Opaque tag supplied by the runner; the core never interprets it.
    Other(String),
}

impl EventType {
    fn as_tag(&self) -> &str {
        match self {
            Self::WorkflowStarted => "workflow_started",
            Self::StageStarted => "stage_started",
            Self::StageCompleted => "stage_completed",
            Self::StageFailed => "stage_failed",
            Self::ApprovalRequired => "approval_required",
            Self::ApprovalGranted => "approval_granted",
            Self::ApprovalRejected => "approval_rejected",
            Self::FileCreated => "file_created",
            Self::WorkflowCompleted => "workflow_completed",
            Self::WorkflowFailed => "workflow_failed",
            Self::WorkflowCancelled => "workflow_cancelled",
            Self::Other(tag) => tag,
        }
    }

    fn from_tag(tag: &str) -> Self {
        match tag {
            "workflow_started" => Self::WorkflowStarted,
            "stage_started" => Self::StageStarted,
            "stage_completed" => Self::StageCompleted,
            "stage_failed" => Self::StageFailed,
            "approval_required" => Self::ApprovalRequired,
            "approval_granted" => Self::ApprovalGranted,
            "approval_rejected" => Self::ApprovalRejected,
            "file_created" => Self::FileCreated,
            "workflow_completed" => Self::WorkflowCompleted,
            "workflow_failed" => Self::WorkflowFailed,
            "workflow_cancelled" => Self::WorkflowCancelled,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_tag())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

/// An ordered, durable record of a workflow-visible step.
///
/// Invariant E1: for a given `workflow_id`, sequences are `{1, .., N}`, gap-free.
/// Invariant E3: append-only; never mutated once persisted (except by retention).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub id: EventId,
    pub workflow_id: WorkflowId,
    pub sequence: u64,
    pub timestamp: u64,
    pub agent: String,
    pub event_type: EventType,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
