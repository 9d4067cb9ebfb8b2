//! Common error types for ssedoc

use thiserror::Error;

/// Common result type for ssedoc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the ssedoc crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Event could not be encoded for the wire
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
