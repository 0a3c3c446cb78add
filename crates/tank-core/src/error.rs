//! Common error types for record and package handling

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building or (de)serializing packages
#[derive(Debug, Error)]
pub enum CoreError {
    /// Package cannot be formed from the given input
    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
