use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{
        IntoResponse, Sse,
        sse::{Event, KeepAlive},
    },
};
use futures::stream::Stream;
use http_body_util::BodyExt;
use serde::Deserialize;
use tracing::info;

use super::{
    models::{
        Ack, AssignRequest, AssignResponse, HealthResponse, NodeListResponse,
        NodeTasksResponse, NotifyRequest, ReassignRequest, ReassignResponse,
        RegisterRequest, RegisterResponse, SuccessRequest, UploadResponse,
    },
    state::AppState,
};
use crate::api::error::ApiError;
use crate::dispatch::DispatchEvent;

/// Node registration endpoint (POST /nodes/register)
///
/// Idempotent: re-registering an existing id resets it to active and
/// refreshes `last_seen`, which is how an agent reconnects. The live
/// channel itself is (re)established by the events endpoint.
pub async fn register_node(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.node_id.is_empty() {
        return Err(ApiError::InvalidPayload("node_id must not be empty".into()));
    }

    let node = state.registry.register(&request.node_id).await;
    state.metrics.node_registered();

    Ok(Json(RegisterResponse {
        status: "success".to_string(),
        node_id: node.id,
    }))
}

/// Task assignment endpoint (POST /tasks/assign)
///
/// Creates the task on first sight of the URL and always attempts a push
/// dispatch, so a caller can use this to re-prod a node for a task that
/// already exists. The dispatch happens after the registry lock is
/// released; a live delivery flips the task to processing.
pub async fn assign_task(
    State(state): State<AppState>,
    Json(request): Json<AssignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.url.is_empty() {
        return Err(ApiError::InvalidPayload("url must not be empty".into()));
    }

    let task = state.registry.assign(&request.url, &request.node_id).await;
    state.metrics.task_assigned();

    let delivered = state
        .dispatcher
        .dispatch(
            &request.node_id,
            DispatchEvent::Assignment {
                url: request.url.clone(),
            },
        )
        .await;
    if delivered {
        state.registry.mark_processing(&request.url).await;
    }

    // Re-read so the response reflects the processing flip
    let task = state.registry.task(&request.url).await.unwrap_or(task);

    Ok(Json(AssignResponse {
        status: "success".to_string(),
        task,
    }))
}

/// Success report endpoint (POST /tasks/success)
///
/// Reports for unknown URLs are acked anyway: duplicated or delayed
/// notifications are expected and benign.
pub async fn notify_success(
    State(state): State<AppState>,
    Json(request): Json<SuccessRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .registry
        .notify_success(&request.node_id, &request.url, &request.output_path)
        .await;

    Ok(Json(Ack::success()))
}

/// Reassignment endpoint (POST /tasks/reassign)
///
/// The reporting node takes an immediate cooldown penalty; the task is
/// handed to the least-loaded eligible node and dispatched to it. An empty
/// candidate set is an explicit error result, not a retry loop; the
/// coordinator waits for a new registration or an expired cooldown plus a
/// fresh request.
pub async fn reassign_task(
    State(state): State<AppState>,
    Json(request): Json<ReassignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .registry
        .request_reassignment(&request.node_id, &request.url)
        .await?;
    state.metrics.reassignment();

    state
        .dispatcher
        .dispatch(
            &outcome.target,
            DispatchEvent::Reassignment {
                url: request.url.clone(),
                source_node: outcome.source.clone(),
            },
        )
        .await;

    Ok(Json(ReassignResponse {
        status: "success".to_string(),
        reassigned_to: outcome.target,
    }))
}

/// Node-to-node completion endpoint (POST /tasks/notify)
///
/// Marks the task completed on behalf of the source node, then pushes a
/// relay-ready event to the target if its channel happens to be open.
/// There is no queued retry of that push; an offline target discovers the
/// artifact on its next poll.
pub async fn notify_node(
    State(state): State<AppState>,
    Json(request): Json<NotifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .registry
        .notify_node(&request.source_node, &request.url, &request.output_path)
        .await;

    let pushed = state
        .dispatcher
        .push_once(
            &request.target_node,
            DispatchEvent::RelayReady {
                url: request.url.clone(),
            },
        )
        .await;
    if !pushed {
        info!(
            target = %request.target_node,
            url = %request.url,
            "Target has no live channel, relay-ready not pushed"
        );
    }

    Ok(Json(Ack::success()))
}

#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    pub url: String,
}

/// Artifact upload endpoint (PUT /relay?url=...)
///
/// Persists the raw body under the relay directory (deterministic name
/// derived from the URL) and records the path on the task. Uploading
/// twice for the same URL overwrites silently.
pub async fn upload_artifact(
    State(state): State<AppState>,
    Query(query): Query<RelayQuery>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    super::utils::validate_upload_content_type(content_type)?;

    let data = body
        .collect()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .to_bytes();
    super::utils::validate_body_size(&data, state.config.coordinator.max_upload_bytes)?;

    let path = state.relay.put(&query.url, data).await?;
    state.registry.record_relay_file(&query.url, path.clone()).await;
    state.metrics.relay_upload();

    Ok(Json(UploadResponse {
        status: "success".to_string(),
        file_path: path.display().to_string(),
    }))
}

/// Artifact download endpoint (GET /relay?url=...)
///
/// Serves the stored artifact byte-for-byte. Fails with not_found when the
/// task is unknown, nothing was uploaded for it, or the object is gone
/// from disk.
pub async fn download_artifact(
    State(state): State<AppState>,
    Query(query): Query<RelayQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .registry
        .task(&query.url)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("task {}", query.url)))?;

    if task.relay_file.is_none() {
        return Err(ApiError::NotFound(format!(
            "no relayed artifact for {}",
            query.url
        )));
    }

    let bytes = state.relay.get(&query.url).await?;
    state.metrics.relay_download();

    Ok((
        [(axum::http::header::CONTENT_TYPE, "video/mp4")],
        bytes,
    ))
}

/// Live dispatch channel (GET /nodes/{node_id}/events)
///
/// Opening this stream registers the node (idempotently) and installs its
/// push channel; a reconnect replaces the previous channel. Events arrive
/// as JSON-encoded SSE data frames.
pub async fn node_events(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    if node_id.is_empty() {
        return Err(ApiError::InvalidPayload("node_id must not be empty".into()));
    }

    state.registry.register(&node_id).await;
    let receiver = state.dispatcher.open_channel(&node_id).await;
    info!(node_id, "Live channel opened");

    let stream = futures::stream::unfold(receiver, |mut receiver| async move {
        let event = receiver.recv().await?;
        Some((Event::default().json_data(&event), receiver))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Node list endpoint (GET /nodes), registration order
pub async fn list_nodes(State(state): State<AppState>) -> impl IntoResponse {
    Json(NodeListResponse {
        nodes: state.registry.nodes().await,
    })
}

/// Per-node assignment set (GET /nodes/{node_id}/tasks)
pub async fn node_tasks(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tasks = state
        .registry
        .node_tasks(&node_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("node {node_id}")))?;

    Ok(Json(NodeTasksResponse { node_id, tasks }))
}

/// Task snapshot endpoint (GET /tasks?url=...)
pub async fn get_task(
    State(state): State<AppState>,
    Query(query): Query<RelayQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .registry
        .task(&query.url)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("task {}", query.url)))?;

    Ok(Json(task))
}

/// Health check endpoint (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    use std::collections::HashMap;

    let mut components = HashMap::new();

    // If we can respond, the in-process components are up
    components.insert("api".to_string(), "healthy".to_string());
    components.insert("registry".to_string(), "healthy".to_string());
    components.insert("dispatcher".to_string(), "healthy".to_string());
    components.insert("relay".to_string(), "healthy".to_string());

    let response = HealthResponse {
        status: "healthy".to_string(),
        components,
        metrics: state.metrics.snapshot(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (axum::http::StatusCode::OK, Json(response))
}
