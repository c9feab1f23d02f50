//! HTTP client for the coordinator's node-facing API.

use crate::api::models::{
    Ack, AssignRequest, AssignResponse, NodeTasksResponse, NotifyRequest,
    ReassignRequest, ReassignResponse, RegisterRequest, RegisterResponse,
    SuccessRequest, UploadResponse,
};
use crate::config::FetchConfig;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The coordinator answered with an error result
    #[error("coordinator error ({reason}): {message}")]
    Api { reason: String, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    pub fn reason(&self) -> Option<&str> {
        match self {
            ClientError::Api { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Typed wrapper over the coordinator's RPC surface.
///
/// The underlying client carries only a connect timeout; per-call request
/// timeouts are applied to the short RPCs so the long-lived event stream
/// is never cut off by a global deadline.
pub struct CoordinatorClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl CoordinatorClient {
    pub fn new(base_url: &str, config: &FetchConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn register(&self, node_id: &str) -> Result<RegisterResponse> {
        let response = self
            .http
            .post(self.endpoint("/nodes/register"))
            .timeout(self.request_timeout)
            .json(&RegisterRequest {
                node_id: node_id.to_string(),
            })
            .send()
            .await?;
        expect_json(response).await
    }

    pub async fn assign(&self, url: &str, node_id: &str) -> Result<AssignResponse> {
        let response = self
            .http
            .post(self.endpoint("/tasks/assign"))
            .timeout(self.request_timeout)
            .json(&AssignRequest {
                url: url.to_string(),
                node_id: node_id.to_string(),
            })
            .send()
            .await?;
        expect_json(response).await
    }

    pub async fn notify_success(
        &self,
        node_id: &str,
        url: &str,
        output_path: &str,
    ) -> Result<Ack> {
        let response = self
            .http
            .post(self.endpoint("/tasks/success"))
            .timeout(self.request_timeout)
            .json(&SuccessRequest {
                node_id: node_id.to_string(),
                url: url.to_string(),
                output_path: output_path.to_string(),
            })
            .send()
            .await?;
        expect_json(response).await
    }

    pub async fn request_reassignment(
        &self,
        node_id: &str,
        url: &str,
    ) -> Result<ReassignResponse> {
        let response = self
            .http
            .post(self.endpoint("/tasks/reassign"))
            .timeout(self.request_timeout)
            .json(&ReassignRequest {
                node_id: node_id.to_string(),
                url: url.to_string(),
            })
            .send()
            .await?;
        expect_json(response).await
    }

    pub async fn notify_node(
        &self,
        source_node: &str,
        target_node: &str,
        url: &str,
        output_path: &str,
    ) -> Result<Ack> {
        let response = self
            .http
            .post(self.endpoint("/tasks/notify"))
            .timeout(self.request_timeout)
            .json(&NotifyRequest {
                source_node: source_node.to_string(),
                target_node: target_node.to_string(),
                url: url.to_string(),
                output_path: output_path.to_string(),
            })
            .send()
            .await?;
        expect_json(response).await
    }

    /// Upload an artifact's bytes to the coordinator's relay.
    pub async fn upload_artifact(&self, url: &str, data: Bytes) -> Result<UploadResponse> {
        let response = self
            .http
            .put(self.endpoint("/relay"))
            .timeout(self.request_timeout)
            .query(&[("url", url)])
            .header(
                reqwest::header::CONTENT_TYPE,
                mime::APPLICATION_OCTET_STREAM.as_ref(),
            )
            .body(data)
            .send()
            .await?;
        expect_json(response).await
    }

    /// Pull an artifact's bytes from the coordinator's relay.
    pub async fn download_artifact(&self, url: &str) -> Result<Bytes> {
        let response = self
            .http
            .get(self.endpoint("/relay"))
            .query(&[("url", url)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(response).await);
        }
        Ok(response.bytes().await?)
    }

    pub async fn node_tasks(&self, node_id: &str) -> Result<NodeTasksResponse> {
        let response = self
            .http
            .get(self.endpoint(&format!("/nodes/{node_id}/tasks")))
            .timeout(self.request_timeout)
            .send()
            .await?;
        expect_json(response).await
    }

    /// Open the live event stream. No request timeout: the stream stays up
    /// for the life of the connection.
    pub async fn open_events(&self, node_id: &str) -> Result<reqwest::Response> {
        let response = self
            .http
            .get(self.endpoint(&format!("/nodes/{node_id}/events")))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(response).await);
        }
        debug!(node_id, "Event stream opened");
        Ok(response)
    }
}

async fn expect_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(api_error(response).await)
    }
}

/// Decode the coordinator's `{status, reason, message}` error body; fall
/// back to the HTTP status when the body is unreadable.
async fn api_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);

    let reason = body
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or("http_error")
        .to_string();
    let message = body
        .get("message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("HTTP {status}"));

    ClientError::Api { reason, message }
}
