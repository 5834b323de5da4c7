//! Core types and constants shared across torpydo crates.
//!
//! This crate provides:
//! - Default configuration values
//! - The peer endpoint identifier
//! - The cipher-transforming bidirectional relay
//! - Tracing and shutdown plumbing for the binaries

pub mod defaults;
pub mod endpoint;
pub mod io;
pub mod runtime;

pub use defaults::*;
pub use endpoint::NodeEndpoint;

/// Project name.
pub const PROJECT_NAME: &str = "torpydo-rs";
/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
