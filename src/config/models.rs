use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// Coordinator-side configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Directory where relayed artifacts are stored
    #[serde(default = "default_relay_dir")]
    pub relay_dir: PathBuf,
    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// How long a node that reported a failure stays out of the
    /// reassignment candidate set
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub dispatch_retry: DispatchRetryConfig,
}

impl CoordinatorConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            relay_dir: default_relay_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            cooldown_secs: default_cooldown_secs(),
            dispatch_retry: DispatchRetryConfig::default(),
        }
    }
}

/// Retry policy for pushing dispatch events when a node's live channel
/// is missing or closed
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchRetryConfig {
    #[serde(default = "default_dispatch_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_dispatch_backoff_ms")]
    pub backoff_ms: u64,
}

impl DispatchRetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for DispatchRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_dispatch_attempts(),
            backoff_ms: default_dispatch_backoff_ms(),
        }
    }
}

/// Node-agent configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    #[serde(default = "default_coordinator_url")]
    pub coordinator_url: String,
    /// Node identity; generated as `node-<uuid>` when not set
    pub node_id: Option<String>,
    /// Where fetched and relayed artifacts land on this node
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Opaque quality hint passed through to the fetcher
    #[serde(default = "default_quality")]
    pub quality: String,
    /// Optional cutoff passed to the fetcher (e.g. truncate long media)
    pub time_limit_secs: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            coordinator_url: default_coordinator_url(),
            node_id: None,
            output_dir: default_output_dir(),
            quality: default_quality(),
            time_limit_secs: None,
        }
    }
}

/// HTTP fetcher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl FetchConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8502".parse().unwrap()
}

fn default_relay_dir() -> PathBuf {
    PathBuf::from("data/relay")
}

fn default_max_upload_bytes() -> usize {
    4 * 1024 * 1024 * 1024 // 4 GiB
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_dispatch_attempts() -> u32 {
    3
}

fn default_dispatch_backoff_ms() -> u64 {
    500
}

fn default_coordinator_url() -> String {
    "http://127.0.0.1:8502".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_quality() -> String {
    "1080".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_user_agent() -> String {
    format!("fetchmesh/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.coordinator.bind_addr.to_string(), "0.0.0.0:8502");
        assert_eq!(config.coordinator.cooldown_secs, 300);
        assert_eq!(config.coordinator.dispatch_retry.max_attempts, 3);
        assert_eq!(config.node.coordinator_url, "http://127.0.0.1:8502");
        assert_eq!(config.node.quality, "1080");
        assert!(config.node.node_id.is_none());
    }

    #[test]
    fn test_parse_toml_snippet() {
        let config: Config = toml::from_str(
            r#"
[coordinator]
cooldown_secs = 45

[coordinator.dispatch_retry]
max_attempts = 5

[node]
quality = "720"
            "#,
        )
        .unwrap();

        assert_eq!(config.coordinator.cooldown_secs, 45);
        assert_eq!(config.coordinator.dispatch_retry.max_attempts, 5);
        // Unset keys fall back to struct defaults
        assert_eq!(config.coordinator.dispatch_retry.backoff_ms, 500);
        assert_eq!(config.node.quality, "720");
        assert_eq!(config.fetch.connect_timeout_secs, 10);
    }

    #[test]
    fn test_duration_helpers() {
        let config = Config::default();
        assert_eq!(config.coordinator.cooldown(), Duration::from_secs(300));
        assert_eq!(
            config.coordinator.dispatch_retry.backoff(),
            Duration::from_millis(500)
        );
        assert_eq!(config.fetch.connect_timeout(), Duration::from_secs(10));
    }
}
