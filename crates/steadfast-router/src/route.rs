//! Seams to the downstream route and the dead-letter destination.

use std::fmt;

use async_trait::async_trait;
use steadfast_core::Event;
use thiserror::Error;

/// Why a single route invocation failed.
///
/// Every variant is retried by the router. The variants exist so logs and
/// dead-letter records say what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The route failed for an application reason.
    #[error("route failed: {message}")]
    Failed {
        /// Failure description
        message: String,
    },

    /// The downstream system could not be reached.
    #[error("route unreachable: {message}")]
    Unreachable {
        /// Connection error message
        message: String,
    },

    /// The downstream system answered with a non-success status.
    #[error("route rejected event: HTTP {status_code}")]
    Rejected {
        /// HTTP status code
        status_code: u16,
        /// Response body
        body: String,
    },

    /// The route did not answer in time.
    #[error("route timed out after {timeout_seconds}s")]
    Timeout {
        /// Timeout that elapsed, in seconds
        timeout_seconds: u64,
    },
}

impl RouteError {
    /// Creates an application failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed { message: message.into() }
    }

    /// Creates a connectivity failure.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable { message: message.into() }
    }

    /// Creates a rejection with the downstream status and body.
    pub fn rejected(status_code: u16, body: impl Into<String>) -> Self {
        Self::Rejected { status_code, body: body.into() }
    }

    /// Creates a timeout failure.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }
}

/// The downstream processing step a router keeps retrying.
///
/// A route receives the event and answers with a result event, or fails.
/// Routes must tolerate being invoked again with the same event.
#[async_trait]
pub trait Route: Send + Sync + fmt::Debug {
    /// Processes one delivery attempt.
    async fn invoke(&self, event: Event) -> Result<Event, RouteError>;
}

/// Receiver of events that exhausted their retries.
#[async_trait]
pub trait DeadLetterDestination: Send + Sync + fmt::Debug {
    /// Accepts an abandoned event.
    async fn deliver(&self, event: Event) -> Result<(), RouteError>;
}
