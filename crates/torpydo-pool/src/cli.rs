//! CLI for the pool index server.

use std::path::PathBuf;

use clap::Parser;
use torpydo_core::runtime;

use crate::config::PoolConfig;
use crate::server::PoolIndex;

/// CLI arguments for the pool index server.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "torpydo-pool-index",
    version,
    about = "Pool index — registry of live torpydo nodes"
)]
pub struct PoolIndexArgs {
    /// Config file path (toml).
    #[arg(short, long, default_value = "pool-index.toml")]
    pub config: PathBuf,

    /// Log level override (e.g. "info", "debug", "trace").
    #[arg(long)]
    pub log_level: Option<String>,

    /// Force verbose membership logging, regardless of the config file.
    #[arg(long)]
    pub verbose: bool,

    /// Override the delay (seconds) nodes are asked to wait between
    /// heartbeats.
    #[arg(long)]
    pub requested_delay: Option<f64>,

    /// Override the silence (seconds) after which an entry is evicted.
    #[arg(long)]
    pub deprecation_delay: Option<f64>,

    /// Override the period (seconds) of the eviction sweep.
    #[arg(long)]
    pub gc_cycle: Option<f64>,
}

/// Run the pool index with the given CLI arguments.
pub async fn run(args: PoolIndexArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config_str = std::fs::read_to_string(&args.config)
        .map_err(|e| format!("failed to read config file {:?}: {e}", args.config))?;
    let config: PoolConfig =
        toml::from_str(&config_str).map_err(|e| format!("failed to parse pool config: {e}"))?;

    runtime::init_tracing(args.log_level.as_deref());

    let mut index = PoolIndex::from_config(&config.index);
    if args.verbose {
        index.set_log(true);
    }
    if let Some(seconds) = args.requested_delay {
        index.set_requested_delay(seconds);
    }
    if let Some(seconds) = args.deprecation_delay {
        index.set_deprecation_delay(seconds);
    }
    if let Some(seconds) = args.gc_cycle {
        index.set_garbage_collector_cycle(seconds);
    }

    index
        .start(runtime::shutdown_token())
        .await
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
}
