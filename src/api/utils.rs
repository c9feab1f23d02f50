//! API utility functions
//!
//! Pure, stateless helpers for HTTP request processing, extracted from
//! services.rs so they can be unit tested.

use crate::api::error::ApiError;

/// Validates an optional Content-Type header for raw artifact uploads.
///
/// Absent headers are accepted (the body is opaque bytes). When present,
/// the media type must be `application/octet-stream` or any `video/*`
/// subtype; structured types like multipart are rejected.
pub fn validate_upload_content_type(content_type: Option<&str>) -> Result<(), ApiError> {
    let Some(content_type) = content_type else {
        return Ok(());
    };

    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    let ok = media_type == mime::APPLICATION_OCTET_STREAM
        || media_type.type_() == mime::VIDEO;
    if !ok {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/octet-stream or video/*, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(())
}

/// Validates that body size does not exceed the maximum allowed size
pub fn validate_body_size(data: &[u8], max_size: usize) -> Result<(), ApiError> {
    if data.len() > max_size {
        return Err(ApiError::PayloadTooLarge(data.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_content_type_valid() {
        assert!(validate_upload_content_type(None).is_ok());
        assert!(validate_upload_content_type(Some("application/octet-stream")).is_ok());
        assert!(validate_upload_content_type(Some("video/mp4")).is_ok());
        assert!(validate_upload_content_type(Some("video/webm")).is_ok());
    }

    #[test]
    fn test_upload_content_type_invalid() {
        assert!(validate_upload_content_type(Some("multipart/form-data")).is_err());
        assert!(validate_upload_content_type(Some("application/json")).is_err());
        assert!(validate_upload_content_type(Some("")).is_err());
    }

    #[test]
    fn test_validate_body_size_ok() {
        let data = vec![0u8; 1000];
        assert!(validate_body_size(&data, 1000).is_ok());
        assert!(validate_body_size(&data, 2000).is_ok());
        assert!(validate_body_size(&[], 100).is_ok());
    }

    #[test]
    fn test_validate_body_size_too_large() {
        let data = vec![0u8; 1000];
        let result = validate_body_size(&data, 999);
        match result {
            Err(ApiError::PayloadTooLarge(size)) => assert_eq!(size, 1000),
            _ => panic!("Expected PayloadTooLarge error"),
        }
    }
}
