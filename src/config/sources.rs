use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "FETCHMESH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/fetchmesh.toml";
const ENV_PREFIX: &str = "FETCHMESH";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_sources(config_path)
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    // Start with defaults (handled by struct Default implementations)
    // Add TOML file if it exists (optional)
    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // Add environment variable overrides
    // FETCHMESH__COORDINATOR__BIND_ADDR -> coordinator.bind_addr
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.coordinator.bind_addr.to_string(), "0.0.0.0:8502");
        assert_eq!(config.coordinator.cooldown_secs, 300);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[coordinator]
bind_addr = "127.0.0.1:9000"
cooldown_secs = 60

[coordinator.dispatch_retry]
max_attempts = 5
backoff_ms = 100

[node]
coordinator_url = "http://coord:9000"
node_id = "node-test"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.coordinator.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.coordinator.cooldown_secs, 60);
        assert_eq!(config.coordinator.dispatch_retry.max_attempts, 5);
        assert_eq!(config.node.coordinator_url, "http://coord:9000");
        assert_eq!(config.node.node_id.as_deref(), Some("node-test"));
    }

    // Note: env override tests omitted due to unsafe env::set_var usage;
    // environment layering is exercised in integration tests

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[coordinator]
bind_addr = "0.0.0.0:8502"
relay_dir = "data/relay"
max_upload_bytes = 1073741824
cooldown_secs = 300

[coordinator.dispatch_retry]
max_attempts = 3
backoff_ms = 500

[node]
coordinator_url = "http://127.0.0.1:8502"
output_dir = "output"
quality = "best"
time_limit_secs = 120

[fetch]
connect_timeout_secs = 10
request_timeout_secs = 600
user_agent = "fetchmesh-test"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();

        assert_eq!(config.coordinator.max_upload_bytes, 1073741824);
        assert_eq!(config.node.quality, "best");
        assert_eq!(config.node.time_limit_secs, Some(120));
        assert_eq!(config.fetch.user_agent, "fetchmesh-test");
    }
}
