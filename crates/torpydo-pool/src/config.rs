//! Pool index configuration.

use serde::{Deserialize, Serialize};
use torpydo_core::defaults;

/// Top-level pool index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub index: IndexSettings,
}

/// Pool index listener and lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Address to listen on.
    pub host: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Delay (seconds) nodes are asked to wait between heartbeats.
    #[serde(default = "default_requested_delay")]
    pub requested_delay_secs: f64,

    /// Silence (seconds) after which an entry is evicted.
    #[serde(default = "default_deprecation_delay")]
    pub deprecation_delay_secs: f64,

    /// Period (seconds) of the eviction sweep.
    #[serde(default = "default_gc_cycle")]
    pub gc_cycle_secs: f64,

    /// Verbose (info-level) membership logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_requested_delay() -> f64 {
    defaults::DEFAULT_REQUESTED_DELAY_SECS
}
fn default_deprecation_delay() -> f64 {
    defaults::DEFAULT_DEPRECATION_DELAY_SECS
}
fn default_gc_cycle() -> f64 {
    defaults::DEFAULT_GC_CYCLE_SECS
}
