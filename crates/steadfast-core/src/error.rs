//! Error types for the queue store and domain models.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by object stores and model encoding.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// The backing database rejected or failed an operation.
    #[error("Database error: {0}")]
    Database(String),

    /// A queued entry could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input such as a malformed queue key.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The store was unavailable, used by test stores to inject failures.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl CoreError {
    /// Returns true if retrying the same store call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Unavailable(_))
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(source) => Self::InvalidInput(source.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::Unavailable(err.to_string())
            },
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
