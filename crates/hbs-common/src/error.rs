//! Error types for HBS

use thiserror::Error;

/// Result type alias for HBS operations
pub type Result<T> = std::result::Result<T, HbsError>;

/// Main error type for HBS
#[derive(Error, Debug)]
pub enum HbsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl HbsError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        HbsError::Config(msg.into())
    }
}
