//! Node error types.

use thiserror::Error;
use torpydo_protocol::HandshakeError;

/// Node error type.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("handshake: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("destination {host}:{port} unreachable: {source}")]
    DestinationUnreachable {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
}
