//! Torpydo client.
//!
//! Keeps a cache of known nodes (synced from a pool index), builds an
//! onion path by handshaking with each hop through the hops before it,
//! and then drives end-to-end I/O with one encryption layer per hop.

mod client;
mod error;

pub use client::Client;
pub use error::ClientError;
