//! CLI for the node server.

use std::path::PathBuf;

use clap::Parser;
use torpydo_core::runtime;

use crate::config::NodeConfig;
use crate::node::Node;

/// CLI arguments for the node server.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "torpydo-node",
    version,
    about = "Torpydo node — forwards layered-encrypted streams one hop at a time"
)]
pub struct NodeArgs {
    /// Config file path (toml).
    #[arg(short, long, default_value = "node.toml")]
    pub config: PathBuf,

    /// Log level override (e.g. "info", "debug", "trace").
    #[arg(long)]
    pub log_level: Option<String>,

    /// Force verbose session logging, regardless of the config file.
    #[arg(long)]
    pub verbose: bool,

    /// Pool index to register with ("host:port"), overriding the config
    /// file.
    #[arg(long)]
    pub pool_index: Option<String>,
}

/// Run the node with the given CLI arguments.
pub async fn run(args: NodeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config_str = std::fs::read_to_string(&args.config)
        .map_err(|e| format!("failed to read config file {:?}: {e}", args.config))?;
    let config: NodeConfig =
        toml::from_str(&config_str).map_err(|e| format!("failed to parse node config: {e}"))?;

    runtime::init_tracing(args.log_level.as_deref());

    let mut node = Node::from_config(&config.node);
    if args.verbose {
        node.set_log(true);
    }
    if let Some(index) = &args.pool_index {
        let (host, port) = split_host_port(index)?;
        node.set_pool_index(host, port);
    }

    node.start(runtime::shutdown_token())
        .await
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
}

fn split_host_port(addr: &str) -> Result<(&str, u16), String> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| format!("expected host:port, got {addr:?}"))?;
    if host.is_empty() {
        return Err(format!("empty host in {addr:?}"));
    }
    let port = port
        .parse()
        .map_err(|_| format!("invalid port in {addr:?}"))?;
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::split_host_port;

    #[test]
    fn splits_host_and_port() {
        assert_eq!(split_host_port("127.0.3.2:8080"), Ok(("127.0.3.2", 8080)));
        assert_eq!(split_host_port("index.example:80"), Ok(("index.example", 80)));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(split_host_port("no-port").is_err());
        assert!(split_host_port(":8080").is_err());
        assert!(split_host_port("host:").is_err());
        assert!(split_host_port("host:notaport").is_err());
        assert!(split_host_port("host:99999").is_err());
    }
}
