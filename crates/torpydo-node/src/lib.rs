//! Torpydo node.
//!
//! A node accepts a source connection, runs the server side of the TPDP
//! handshake, opens a connection to the negotiated destination and then
//! pumps bytes both ways — peeling one encryption layer on the way out,
//! adding it back on the way in. When configured, it announces itself to a
//! pool index with periodic heartbeats.

pub mod cli;
pub mod config;
mod error;
mod node;
mod session;

pub use error::NodeError;
pub use node::{BoundNode, Node};
pub use tokio_util::sync::CancellationToken;
