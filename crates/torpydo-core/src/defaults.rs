//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

/// Default per-step handshake timeout in seconds.
pub const DEFAULT_HANDSHAKE_STEP_TIMEOUT_SECS: u64 = 10;

/// Default relay buffer size per direction (32 KiB).
pub const DEFAULT_RELAY_BUFFER_SIZE: usize = 32768;

/// Default retry delay (seconds) when a heartbeat to the pool index fails.
pub const DEFAULT_HEARTBEAT_RETRY_SECS: u64 = 10;

/// Default delay (seconds) a pool index asks nodes to wait between heartbeats.
pub const DEFAULT_REQUESTED_DELAY_SECS: f64 = 15.0;

/// Default silence (seconds) after which a pool index entry is evicted.
pub const DEFAULT_DEPRECATION_DELAY_SECS: f64 = 30.0;

/// Default period (seconds) of the pool index eviction sweep.
pub const DEFAULT_GC_CYCLE_SECS: f64 = 10.0;

/// Default timeout (seconds) for a complete pool index request.
pub const DEFAULT_POOL_REQUEST_TIMEOUT_SECS: u64 = 10;
