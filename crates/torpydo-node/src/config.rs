//! Node configuration.

use serde::{Deserialize, Serialize};
use torpydo_core::defaults;

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSettings,
}

/// Node listener and session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Address to listen on. Also announced to the pool index.
    pub host: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Pool index to heartbeat to. Absent = no registration.
    #[serde(default)]
    pub pool_index: Option<PoolIndexSettings>,

    /// Per-step handshake timeout (seconds).
    #[serde(default = "default_handshake_step_timeout")]
    pub handshake_step_timeout_secs: u64,

    /// Relay buffer size per direction (bytes).
    #[serde(default = "default_relay_buffer_size")]
    pub relay_buffer_size: usize,

    /// Verbose (info-level) session logging.
    #[serde(default)]
    pub verbose: bool,
}

/// Address of the pool index a node registers with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolIndexSettings {
    pub host: String,
    pub port: u16,
}

fn default_handshake_step_timeout() -> u64 {
    defaults::DEFAULT_HANDSHAKE_STEP_TIMEOUT_SECS
}
fn default_relay_buffer_size() -> usize {
    defaults::DEFAULT_RELAY_BUFFER_SIZE
}
