use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "fetchmesh")]
#[command(about = "Distributed download coordinator and node agent", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the coordinator service
    Coordinator,
    /// Run a node agent connected to a coordinator
    Node(NodeArgs),
}

#[derive(clap::Args, Debug)]
pub struct NodeArgs {
    /// Override the node id from configuration
    #[arg(long)]
    pub node_id: Option<String>,

    /// Override the coordinator URL from configuration
    #[arg(long)]
    pub coordinator_url: Option<String>,
}
