mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use fetchmesh::agent::NodeAgent;
use fetchmesh::api;
use fetchmesh::config::Config;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command {
        Commands::Coordinator => api::run(config).await?,
        Commands::Node(args) => {
            if let Some(node_id) = args.node_id {
                config.node.node_id = Some(node_id);
            }
            if let Some(url) = args.coordinator_url {
                config.node.coordinator_url = url;
            }

            let agent = Arc::new(NodeAgent::from_config(&config)?);
            agent.run().await?;
        }
    }

    Ok(())
}
