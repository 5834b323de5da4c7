//! Handshake failure classification.

use thiserror::Error;

use crate::wire::WireError;

/// Why a handshake attempt failed.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The peer deviated from the expected byte sequence.
    #[error("peer violated the handshake protocol: {0}")]
    Protocol(&'static str),

    /// A handshake step exceeded its deadline.
    #[error("handshake step timed out")]
    Timeout,

    /// The peer closed the connection mid-handshake.
    #[error("peer closed the connection mid-handshake")]
    ClosedByPeer,

    /// The peer reported an error code before closing.
    #[error("peer reported a {0} error")]
    PeerReported(WireError),

    /// Socket-level failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
