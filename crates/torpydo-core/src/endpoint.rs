//! Peer endpoint identifier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A peer address: DNS name or IP literal, plus TCP port.
///
/// Equality and hashing are on the `(host, port)` pair, so sets of
/// endpoints deduplicate naturally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeEndpoint {
    /// Host name or IP literal.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl NodeEndpoint {
    /// Create an endpoint from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
