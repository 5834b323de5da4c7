//! Async I/O building blocks.

mod relay;

pub use relay::{relay_bidirectional, RelayTotals};
