//! Common error types for maxgrade

use thiserror::Error;

/// Common result type for maxgrade operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared across maxgrade crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
