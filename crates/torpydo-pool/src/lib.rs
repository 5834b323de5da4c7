//! Pool index: a lightweight live-node registry.
//!
//! Nodes register themselves with periodic heartbeats; clients fetch the
//! current listing. Entries that stay silent longer than the deprecation
//! delay are evicted by a background sweep. The index is trust-on-first-use
//! and carries no authentication.

pub mod cli;
pub mod config;
mod error;
mod registry;
mod server;
pub mod wire;

pub use error::PoolError;
pub use registry::Registry;
pub use server::{BoundPoolIndex, PoolIndex};
pub use tokio_util::sync::CancellationToken;
