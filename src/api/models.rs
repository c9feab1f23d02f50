//! Wire models for the coordinator's node-facing API.
//!
//! Every mutating endpoint returns a `status: "success" | "error"` field;
//! errors additionally carry a machine-readable `reason` (see
//! [`super::error::ApiError`]). Task state is reported as the registry's
//! [`TaskSnapshot`] verbatim.

use crate::registry::{NodeSnapshot, TaskSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegisterRequest {
    pub node_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegisterResponse {
    pub status: String,
    pub node_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AssignRequest {
    pub url: String,
    pub node_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AssignResponse {
    pub status: String,
    pub task: TaskSnapshot,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SuccessRequest {
    pub node_id: String,
    pub url: String,
    pub output_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReassignRequest {
    pub node_id: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReassignResponse {
    pub status: String,
    pub reassigned_to: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotifyRequest {
    pub source_node: String,
    pub target_node: String,
    pub url: String,
    pub output_path: String,
}

/// Plain acknowledgement for notify-style endpoints
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Ack {
    pub status: String,
}

impl Ack {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadResponse {
    pub status: String,
    pub file_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NodeListResponse {
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NodeTasksResponse {
    pub node_id: String,
    pub tasks: Vec<TaskSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub reason: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub metrics: crate::observability::MetricsSnapshot,
    pub version: String,
}
