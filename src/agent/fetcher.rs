//! The fetch seam. The coordinator protocol treats the actual download
//! mechanism as opaque: anything that can turn a URL into a local file
//! behind [`Fetcher`] plugs in (a media downloader binary, a scraper, the
//! plain HTTP implementation below).

use crate::config::FetchConfig;
use crate::relay::artifact_name;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Failed(String),

    #[error("fetch timed out")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FetchError>;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` into a local file and return its path. The quality hint
    /// is an opaque pass-through; `time_limit` caps the whole operation
    /// when the implementation supports one.
    async fn fetch(
        &self,
        url: &str,
        quality: &str,
        time_limit: Option<Duration>,
    ) -> Result<PathBuf>;
}

/// Plain HTTP fetcher: streams the response body to a file named after
/// the URL. Ignores the quality hint (a single HTTP resource has only one
/// rendition) and maps the time limit onto the request deadline.
pub struct HttpFetcher {
    client: reqwest::Client,
    output_dir: PathBuf,
    request_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig, output_dir: &Path) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Failed(e.to_string()))?;

        Ok(Self {
            client,
            output_dir: output_dir.to_path_buf(),
            request_timeout: config.request_timeout(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        quality: &str,
        time_limit: Option<Duration>,
    ) -> Result<PathBuf> {
        debug!(url, quality, "Starting fetch");

        let deadline = time_limit.unwrap_or(self.request_timeout);
        let response = self
            .client
            .get(url)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Failed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Fetch rejected by origin");
            return Err(FetchError::Failed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(artifact_name(url));
        let mut file = tokio::fs::File::create(&path).await?;

        let mut response = response;
        let mut written = 0usize;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Failed(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        debug!(url, path = %path.display(), size = written, "Fetch completed");
        Ok(path)
    }
}
