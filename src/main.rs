//! Unified torpydo CLI.
//!
//! This binary provides a unified interface to the torpydo components:
//! - `torpydo node` - Run a forwarding node
//! - `torpydo pool-index` - Run a pool index server

use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// Torpydo unified CLI.
#[derive(Parser)]
#[command(
    name = "torpydo",
    version,
    about = "Peer-to-peer onion-routing overlay for anonymised TCP streams",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a forwarding node.
    #[command(name = "node")]
    Node(torpydo_node::cli::NodeArgs),

    /// Run a pool index server.
    #[command(name = "pool-index", alias = "index")]
    PoolIndex(torpydo_pool::cli::PoolIndexArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result: Result<(), String> = match cli.command {
        Commands::Node(args) => torpydo_node::cli::run(args).await.map_err(|e| e.to_string()),
        Commands::PoolIndex(args) => torpydo_pool::cli::run(args).await.map_err(|e| e.to_string()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
