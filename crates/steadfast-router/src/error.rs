//! Error types for router configuration, lifecycle, and persistence.
//!
//! Delivery failures of a single attempt are not errors at this level: they
//! are classified into outcomes and retried. A [`RouterError`] reaches the
//! caller only when the router cannot accept or process work at all.

use std::time::Duration;

use steadfast_core::CoreError;
use thiserror::Error;

use crate::expression::ExpressionError;

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors surfaced by router configuration and lifecycle operations.
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    /// Invalid router configuration detected while building.
    #[error("invalid router configuration: {message}")]
    ConfigurationError {
        /// What is wrong with the configuration
        message: String,
    },

    /// An ack or failure expression is not understood by the evaluator.
    #[error("invalid expression: {0}")]
    InvalidExpression(#[from] ExpressionError),

    /// `process` was called before `start`.
    #[error("router {name} is not started")]
    NotStarted {
        /// Router name
        name: String,
    },

    /// `start` was called on a router that is already running.
    #[error("router {name} is already started")]
    AlreadyStarted {
        /// Router name
        name: String,
    },

    /// The router has been stopped and accepts no more work.
    #[error("router {name} is stopped")]
    Stopped {
        /// Router name
        name: String,
    },

    /// The object store failed while persisting or recovering events.
    #[error("object store error: {message}")]
    StoreError {
        /// Store error message
        message: String,
    },

    /// A worker task panicked.
    #[error("worker {worker_id} panicked: {error}")]
    WorkerPanic {
        /// Index of the worker that panicked
        worker_id: usize,
        /// Panic message
        error: String,
    },

    /// Workers did not finish within the shutdown timeout.
    #[error("worker shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// Timeout that was exceeded
        timeout: Duration,
    },
}

impl RouterError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreError { message: message.into() }
    }

    /// Returns true if the error was raised while building the router.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ConfigurationError { .. } | Self::InvalidExpression(_))
    }

    /// Returns true if the call was rejected because of the router state.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::NotStarted { .. } | Self::AlreadyStarted { .. } | Self::Stopped { .. }
        )
    }
}

impl From<CoreError> for RouterError {
    fn from(error: CoreError) -> Self {
        Self::store(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_classified() {
        assert!(RouterError::configuration("both waits set").is_configuration());
        assert!(RouterError::InvalidExpression(ExpressionError::Unsupported {
            expression: "#[nope]".into()
        })
        .is_configuration());
        assert!(!RouterError::store("down").is_configuration());
    }

    #[test]
    fn lifecycle_errors_are_classified() {
        assert!(RouterError::NotStarted { name: "r".into() }.is_lifecycle());
        assert!(RouterError::Stopped { name: "r".into() }.is_lifecycle());
        assert!(!RouterError::store("boom").is_lifecycle());
    }

    #[test]
    fn store_failures_keep_their_message() {
        let error = RouterError::from(CoreError::Unavailable("disk full".into()));

        assert!(matches!(error, RouterError::StoreError { .. }));
        assert_eq!(error.to_string(), "object store error: Store unavailable: disk full");
    }
}
