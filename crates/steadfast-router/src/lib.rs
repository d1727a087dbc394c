//! Until-successful message routing.
//!
//! A [`Router`] hands each event to a downstream [`Route`] and keeps trying
//! until the route succeeds or the retry budget is spent, then forwards the
//! event to a [`DeadLetterDestination`]. Without an object store the retry
//! loop runs inline on the caller; with one, events are persisted and
//! retried by background workers that also resume pending events after a
//! restart.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod dead_letter;
pub mod error;
pub mod expression;
pub mod outcome;
pub mod policy;
pub mod route;
pub mod router;
mod strategy;
mod worker;
mod worker_pool;

pub use client::{ClientConfig, HttpDestination};
pub use config::{Config, LogFormat};
pub use dead_letter::{DeadLetterForwarder, Disposition};
pub use error::{Result, RouterError};
pub use expression::{BasicEvaluator, ExpressionError, ExpressionEvaluator};
pub use outcome::{Ack, FailureCause, Outcome, OutcomeClassifier};
pub use policy::{RetryPolicy, RetrySettings};
pub use route::{DeadLetterDestination, Route, RouteError};
pub use router::{Router, RouterBuilder, RouterState};
pub use strategy::RouterStats;
