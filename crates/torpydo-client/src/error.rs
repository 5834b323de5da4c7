//! Client error types.

use thiserror::Error;
use torpydo_protocol::WireError;

/// Client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// No first-hop connection is open.
    #[error("not connected")]
    NotConnected,

    /// A path could not be assembled from the known nodes.
    #[error("path build failed: {0}")]
    PathBuild(String),

    /// A node deviated from the expected handshake byte sequence.
    #[error("node violated the handshake protocol: {0}")]
    Protocol(&'static str),

    /// A node reported an error code before closing.
    #[error("node reported a {0} error")]
    NodeReported(WireError),

    /// The stream closed before a full read completed.
    #[error("connection closed mid-stream")]
    ClosedMidStream,
}
