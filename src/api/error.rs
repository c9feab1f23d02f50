use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use super::models::ErrorResponse;
use crate::registry::RegistryError;
use crate::relay::RelayError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("no available nodes")]
    NoAvailableNodes,
    #[error("unknown task: {0}")]
    UnknownTask(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("relay failure: {0}")]
    Relay(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NoAvailableNodes => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::UnknownTask(_) => StatusCode::NOT_FOUND,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Relay(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable reason carried in every error response
    pub fn reason(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "invalid_payload",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::NoAvailableNodes => "no_available_nodes",
            ApiError::UnknownTask(_) => "unknown_task",
            ApiError::NotFound(_) => "not_found",
            ApiError::Relay(_) => "relay_io",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            status: "error",
            reason: self.reason(),
            message: self.to_string(),
        };

        (status, Json(json!(body))).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(value: RegistryError) -> Self {
        match value {
            RegistryError::NoAvailableNodes => ApiError::NoAvailableNodes,
            RegistryError::UnknownTask(url) => ApiError::UnknownTask(url),
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(value: RelayError) -> Self {
        match value {
            RelayError::NotFound(url) => ApiError::NotFound(url),
            other => ApiError::Relay(other.to_string()),
        }
    }
}
