//! Store-and-forward artifact relay.
//!
//! When the node that completed a download cannot reach the node that
//! needs the file, the artifact is parked here: uploaded to the
//! coordinator, persisted under the relay directory, and served back out
//! on demand. Built on the object_store crate with a local-filesystem
//! backend (in-memory for tests).

use bytes::Bytes;
use object_store::{ObjectStore, path::Path as StoragePath};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Fixed extension for relayed media artifacts
const MEDIA_EXT: &str = "mp4";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("relay store unavailable: {0}")]
    Unavailable(String),

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// Coordinator-side artifact store
#[derive(Clone)]
pub struct RelayStore {
    store: Arc<dyn ObjectStore>,
    dir: PathBuf,
}

impl RelayStore {
    /// Open a relay store backed by a local directory, creating it if
    /// needed.
    pub fn local(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| RelayError::Unavailable(e.to_string()))?;
        let store = object_store::local::LocalFileSystem::new_with_prefix(dir)?;
        Ok(Self {
            store: Arc::new(store),
            dir: dir.to_path_buf(),
        })
    }

    /// In-memory relay for tests
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
            dir: PathBuf::from("memory"),
        }
    }

    /// Persist an uploaded artifact. A second upload for the same URL
    /// silently overwrites; there is no versioning.
    ///
    /// Returns the coordinator-local path recorded on the task.
    pub async fn put(&self, url: &str, data: Bytes) -> Result<PathBuf> {
        let name = artifact_name(url);
        let size = data.len();

        self.store.put(&StoragePath::from(name.as_str()), data.into()).await?;

        tracing::info!(url, name, size, "Artifact stored on relay");
        Ok(self.dir.join(name))
    }

    /// Fetch a stored artifact, byte-for-byte as uploaded.
    pub async fn get(&self, url: &str) -> Result<Bytes> {
        let name = artifact_name(url);

        let result = self
            .store
            .get(&StoragePath::from(name.as_str()))
            .await
            .map_err(|e| match e {
                object_store::Error::NotFound { .. } => RelayError::NotFound(url.to_string()),
                other => RelayError::ObjectStore(other),
            })?;

        let bytes = result.bytes().await?;
        tracing::info!(url, name, size = bytes.len(), "Artifact served from relay");
        Ok(bytes)
    }

    /// The local path an upload for this URL would land at
    pub fn artifact_path(&self, url: &str) -> PathBuf {
        self.dir.join(artifact_name(url))
    }
}

/// Deterministic artifact name: the URL's trailing path segment, sanitized,
/// any extension replaced by the fixed media extension.
pub fn artifact_name(url: &str) -> String {
    let trimmed = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/');

    let segment = trimmed.rsplit('/').next().unwrap_or("");
    let stem = segment.rsplit_once('.').map_or(segment, |(stem, _)| stem);

    let clean: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect();

    if clean.is_empty() {
        format!("artifact.{MEDIA_EXT}")
    } else {
        format!("{clean}.{MEDIA_EXT}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name_from_trailing_segment() {
        assert_eq!(artifact_name("http://x/videos/abc123"), "abc123.mp4");
        assert_eq!(artifact_name("http://x/v/clip.webm"), "clip.mp4");
        assert_eq!(artifact_name("http://x/v/clip.mp4?t=42"), "clip.mp4");
        assert_eq!(artifact_name("http://x/v/watch#frag"), "watch.mp4");
    }

    #[test]
    fn test_artifact_name_sanitizes() {
        assert_eq!(artifact_name("http://x/a b<c>.mov"), "abc.mp4");
        assert_eq!(artifact_name("http://x/"), "artifact.mp4");
    }

    #[test]
    fn test_artifact_name_is_deterministic() {
        let url = "https://cdn.example.com/media/dQw4w9WgXcQ";
        assert_eq!(artifact_name(url), artifact_name(url));
    }

    #[tokio::test]
    async fn test_put_then_get_roundtrip() {
        let relay = RelayStore::in_memory();
        let payload = Bytes::from_static(b"fake video bytes");

        let path = relay.put("http://x/v/clip", payload.clone()).await.unwrap();
        assert!(path.ends_with("clip.mp4"));

        let served = relay.get("http://x/v/clip").await.unwrap();
        assert_eq!(served, payload);
    }

    #[tokio::test]
    async fn test_put_overwrites_silently() {
        let relay = RelayStore::in_memory();

        relay
            .put("http://x/v/clip", Bytes::from_static(b"first"))
            .await
            .unwrap();
        relay
            .put("http://x/v/clip", Bytes::from_static(b"second"))
            .await
            .unwrap();

        assert_eq!(
            relay.get("http://x/v/clip").await.unwrap(),
            Bytes::from_static(b"second")
        );
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let relay = RelayStore::in_memory();
        assert!(matches!(
            relay.get("http://x/v/none").await,
            Err(RelayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_store_writes_under_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let relay = RelayStore::local(temp_dir.path()).unwrap();

        let path = relay
            .put("http://x/v/clip", Bytes::from_static(b"data"))
            .await
            .unwrap();
        assert_eq!(path, temp_dir.path().join("clip.mp4"));
        assert!(path.exists());
    }
}
