use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("dispatch_retry.max_attempts must be at least 1")]
    ZeroDispatchAttempts,

    #[error("coordinator.relay_dir must not be empty")]
    EmptyRelayDir,

    #[error("node.output_dir must not be empty")]
    EmptyOutputDir,

    #[error("node.coordinator_url is not a valid URL: {0}")]
    InvalidCoordinatorUrl(String),

    #[error("coordinator.max_upload_bytes must be at least 1")]
    ZeroUploadLimit,
}

/// Validate cross-field constraints that serde defaults cannot express
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    if config.coordinator.dispatch_retry.max_attempts == 0 {
        return Err(ValidationError::ZeroDispatchAttempts);
    }

    if config.coordinator.relay_dir.as_os_str().is_empty() {
        return Err(ValidationError::EmptyRelayDir);
    }

    if config.node.output_dir.as_os_str().is_empty() {
        return Err(ValidationError::EmptyOutputDir);
    }

    if config.coordinator.max_upload_bytes == 0 {
        return Err(ValidationError::ZeroUploadLimit);
    }

    let url = &config.node.coordinator_url;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ValidationError::InvalidCoordinatorUrl(url.clone()));
    }

    Ok(())
}
