//! Node agent: registers with the coordinator, listens on the live
//! channel, runs fetches on spawned worker tasks, and reports outcomes.

use super::client::{ClientError, CoordinatorClient};
use super::events::EventStream;
use super::fetcher::{Fetcher, HttpFetcher};
use crate::config::Config;
use crate::dispatch::DispatchEvent;
use crate::registry::TaskStatus;
use crate::relay::artifact_name;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Called with the final local path once a task completes on this node;
/// the seam where downstream processing (transcription, UI refresh, ...)
/// hangs off.
pub type CompletionHook = Arc<dyn Fn(&Path) + Send + Sync>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("fetch setup failed: {0}")]
    Fetch(#[from] super::fetcher::FetchError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("coordinator unreachable after {0} attempts")]
    Unreachable(u32),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// What happened to one download attempt on this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Fetched locally; path of the artifact
    Completed(PathBuf),
    /// Fetch failed; the coordinator handed the task to this node
    Reassigned(String),
    /// Fetch failed and no other node could take the task
    Abandoned,
}

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_BACKOFF: Duration = Duration::from_secs(1);

pub struct NodeAgent {
    node_id: String,
    client: CoordinatorClient,
    fetcher: Arc<dyn Fetcher>,
    output_dir: PathBuf,
    quality: String,
    time_limit: Option<Duration>,
    on_complete: Option<CompletionHook>,
}

impl NodeAgent {
    pub fn from_config(config: &Config) -> Result<Self> {
        let node_id = config
            .node
            .node_id
            .clone()
            .unwrap_or_else(|| format!("node-{}", uuid::Uuid::new_v4()));

        let client = CoordinatorClient::new(&config.node.coordinator_url, &config.fetch)?;
        let fetcher = HttpFetcher::new(&config.fetch, &config.node.output_dir)?;

        Ok(Self {
            node_id,
            client,
            fetcher: Arc::new(fetcher),
            output_dir: config.node.output_dir.clone(),
            quality: config.node.quality.clone(),
            time_limit: config.node.time_limit_secs.map(Duration::from_secs),
            on_complete: None,
        })
    }

    /// Swap in a different fetch implementation (e.g. a media downloader).
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_completion_hook(mut self, hook: CompletionHook) -> Self {
        self.on_complete = Some(hook);
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Attempt one download and report the outcome to the coordinator.
    ///
    /// The fetch is never retried locally: any failure immediately asks
    /// the coordinator to move the task to another node.
    pub async fn download(&self, url: &str) -> Result<DownloadOutcome> {
        match self
            .fetcher
            .fetch(url, &self.quality, self.time_limit)
            .await
        {
            Ok(path) => {
                self.client
                    .notify_success(&self.node_id, url, &path.display().to_string())
                    .await?;
                info!(url, path = %path.display(), "Download completed");
                self.run_hook(&path);
                Ok(DownloadOutcome::Completed(path))
            }
            Err(e) => {
                warn!(url, error = %e, "Download failed, requesting reassignment");
                self.hand_off(url).await
            }
        }
    }

    /// Run a task that was moved here from `source_node`: fetch, park the
    /// artifact on the coordinator's relay, and notify the origin through
    /// the coordinator.
    pub async fn handle_reassignment(
        &self,
        url: &str,
        source_node: &str,
    ) -> Result<DownloadOutcome> {
        match self
            .fetcher
            .fetch(url, &self.quality, self.time_limit)
            .await
        {
            Ok(path) => {
                let data = tokio::fs::read(&path).await?;
                self.client.upload_artifact(url, data.into()).await?;
                self.client
                    .notify_node(
                        &self.node_id,
                        source_node,
                        url,
                        &path.display().to_string(),
                    )
                    .await?;
                info!(url, source_node, "Reassigned download completed and relayed");
                self.run_hook(&path);
                Ok(DownloadOutcome::Completed(path))
            }
            Err(e) => {
                warn!(url, error = %e, "Reassigned download failed, handing off again");
                self.hand_off(url).await
            }
        }
    }

    /// Pull a relayed artifact into this node's own output directory.
    pub async fn pull_relay(&self, url: &str) -> Result<PathBuf> {
        let bytes = self.client.download_artifact(url).await?;

        let dir = self.output_dir.join(&self.node_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(artifact_name(url));
        tokio::fs::write(&path, &bytes).await?;

        info!(url, path = %path.display(), "Relayed artifact pulled");
        self.run_hook(&path);
        Ok(path)
    }

    async fn hand_off(&self, url: &str) -> Result<DownloadOutcome> {
        match self.client.request_reassignment(&self.node_id, url).await {
            Ok(response) => Ok(DownloadOutcome::Reassigned(response.reassigned_to)),
            Err(e) if e.reason() == Some("no_available_nodes") => {
                warn!(url, "No nodes available to take over");
                Ok(DownloadOutcome::Abandoned)
            }
            Err(e) if e.reason() == Some("unknown_task") => {
                warn!(url, "Coordinator does not know this task");
                Ok(DownloadOutcome::Abandoned)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// React to one push event. Fetch work runs right here; `run` spawns
    /// each event onto its own task so the stream never blocks on a slow
    /// download.
    pub async fn handle_event(&self, event: DispatchEvent) {
        let result = match event {
            DispatchEvent::Assignment { url } => self.download(&url).await.map(|_| ()),
            DispatchEvent::Reassignment { url, source_node } => self
                .handle_reassignment(&url, &source_node)
                .await
                .map(|_| ()),
            DispatchEvent::RelayReady { url } => self.pull_relay(&url).await.map(|_| ()),
        };

        if let Err(e) = result {
            error!(node_id = %self.node_id, error = %e, "Event handling failed");
        }
    }

    /// Establish the live channel. Opening the event stream registers the
    /// node; when that path fails the agent falls back to the synchronous
    /// register call before retrying, and gives up after a bounded number
    /// of attempts rather than spinning forever.
    async fn connect(&self) -> Result<EventStream> {
        for attempt in 1..=CONNECT_ATTEMPTS {
            match self.client.open_events(&self.node_id).await {
                Ok(response) => {
                    info!(node_id = %self.node_id, "Connected to coordinator");
                    return Ok(EventStream::new(response));
                }
                Err(e) => {
                    warn!(
                        node_id = %self.node_id,
                        attempt,
                        error = %e,
                        "Event stream failed, registering synchronously"
                    );
                    if let Err(e) = self.client.register(&self.node_id).await {
                        warn!(error = %e, "Synchronous registration failed");
                    }
                    tokio::time::sleep(CONNECT_BACKOFF * attempt).await;
                }
            }
        }

        Err(AgentError::Unreachable(CONNECT_ATTEMPTS))
    }

    /// Pick up tasks this node already owns. This is the fallback delivery
    /// path for dispatches that were dropped while the channel was down.
    async fn resume_pending(self: &Arc<Self>) -> Result<()> {
        let snapshot = self.client.node_tasks(&self.node_id).await?;

        for task in snapshot.tasks {
            let runnable = matches!(
                task.status,
                TaskStatus::Pending | TaskStatus::Processing | TaskStatus::Reassigned
            );
            if !runnable {
                continue;
            }

            info!(url = %task.url, status = ?task.status, "Resuming owned task");
            let agent = Arc::clone(self);
            let event = match task.reassigned_from {
                Some(source_node) if task.status == TaskStatus::Reassigned => {
                    DispatchEvent::Reassignment {
                        url: task.url,
                        source_node,
                    }
                }
                _ => DispatchEvent::Assignment { url: task.url },
            };
            tokio::spawn(async move { agent.handle_event(event).await });
        }

        Ok(())
    }

    /// Main loop: connect, resume owned work, then serve push events until
    /// the coordinator goes away for good.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        loop {
            let mut stream = self.connect().await?;
            self.resume_pending().await?;

            loop {
                match stream.next_event().await {
                    Ok(Some(event)) => {
                        // Dedicated worker task per event: a long fetch
                        // must not stall heartbeats or further dispatches
                        let agent = Arc::clone(&self);
                        tokio::spawn(async move { agent.handle_event(event).await });
                    }
                    Ok(None) => {
                        warn!(node_id = %self.node_id, "Event stream closed, reconnecting");
                        break;
                    }
                    Err(e) => {
                        warn!(node_id = %self.node_id, error = %e, "Event stream error, reconnecting");
                        break;
                    }
                }
            }
        }
    }

    fn run_hook(&self, path: &Path) {
        if let Some(hook) = &self.on_complete {
            hook(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_generates_node_id() {
        let config = Config::default();
        let agent = NodeAgent::from_config(&config).unwrap();
        assert!(agent.node_id().starts_with("node-"));
    }

    #[test]
    fn test_agent_keeps_configured_node_id() {
        let mut config = Config::default();
        config.node.node_id = Some("node-7".to_string());
        let agent = NodeAgent::from_config(&config).unwrap();
        assert_eq!(agent.node_id(), "node-7");
    }
}
