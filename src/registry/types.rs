use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

/// Node availability as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
    Failed,
}

/// Task lifecycle. Tasks are keyed by their resource URL and are never
/// deleted; completed and failed entries stay behind as an audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Reassigned,
    Failed,
}

/// Coordinator-internal node record.
///
/// `last_failure` is a monotonic instant so cooldown comparisons are immune
/// to wall-clock jumps; `last_failure_at` is the wall-clock copy surfaced in
/// snapshots.
#[derive(Debug, Clone)]
pub(crate) struct NodeRecord {
    pub status: NodeStatus,
    pub last_seen: DateTime<Utc>,
    pub last_failure: Option<Instant>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl NodeRecord {
    pub fn new() -> Self {
        Self {
            status: NodeStatus::Active,
            last_seen: Utc::now(),
            last_failure: None,
            last_failure_at: None,
        }
    }
}

/// Read-only view of a node, safe to hand out across the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: String,
    pub status: NodeStatus,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_seen: DateTime<Utc>,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Number of tasks currently in this node's assignment set
    pub assigned: usize,
}

/// Full task state. The registry stores this directly; API responses
/// serialize it as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub url: String,
    pub status: TaskStatus,
    /// Current owning node (the reassignment target after a hand-off)
    pub assigned_to: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reassigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reassigned_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reassigned_at: Option<DateTime<Utc>>,
    /// Coordinator-local path of the uploaded artifact, once relayed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_file: Option<PathBuf>,
}

impl TaskSnapshot {
    pub fn new(url: String, node_id: String) -> Self {
        Self {
            url,
            status: TaskStatus::Pending,
            assigned_to: node_id,
            created_at: Utc::now(),
            completed_at: None,
            completed_by: None,
            output_path: None,
            reassigned_to: None,
            reassigned_from: None,
            reassigned_at: None,
            relay_file: None,
        }
    }
}

/// Result of a successful reassignment hand-off
#[derive(Debug, Clone)]
pub struct Reassignment {
    pub task: TaskSnapshot,
    pub source: String,
    pub target: String,
}
