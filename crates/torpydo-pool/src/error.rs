//! Pool index error types.

use thiserror::Error;

/// Pool index error type.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(String),
}
