//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("invalid version range: {0}")]
    InvalidVersion(String),

    #[error("invalid platform: {0}")]
    InvalidPlatform(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
