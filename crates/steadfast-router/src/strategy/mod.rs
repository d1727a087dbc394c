//! Processing strategies and the attempt pipeline they share.
//!
//! Both strategies drive the same [`Pipeline`]: invoke the route, classify
//! the result, keep statistics, and hand abandoned events to the dead-letter
//! forwarder. They differ only in where the retry loop lives. The
//! synchronous strategy loops inline on the caller's task; the asynchronous
//! strategy persists the event and lets workers drive it.

use std::sync::Arc;

use serde::Serialize;
use steadfast_core::{Clock, Event};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::{
    dead_letter::{DeadLetterForwarder, Disposition},
    error::Result,
    outcome::{Ack, FailureCause, Outcome, OutcomeClassifier},
    policy::RetryPolicy,
    route::Route,
};

mod asynchronous;
mod synchronous;

pub(crate) use asynchronous::{AsynchronousStrategy, KeyFeed};
pub(crate) use synchronous::SynchronousStrategy;

/// Counters describing what a router has done since it was built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Workers currently running (asynchronous routers only).
    pub active_workers: usize,
    /// Events accepted by `process`.
    pub events_accepted: u64,
    /// Events found in the object store at start.
    pub recovered_events: u64,
    /// Route invocations.
    pub attempts: u64,
    /// Attempts classified as success.
    pub successful_deliveries: u64,
    /// Attempts classified as failure, transient or permanent.
    pub failed_attempts: u64,
    /// Events that exhausted their retries.
    pub permanent_failures: u64,
    /// Events accepted by the dead-letter destination.
    pub dead_lettered: u64,
    /// Route invocations currently running.
    pub in_flight: u64,
}

/// Attempt pipeline shared by both strategies.
#[derive(Debug)]
pub(crate) struct Pipeline {
    router: String,
    route: Arc<dyn Route>,
    classifier: OutcomeClassifier,
    dead_letter: DeadLetterForwarder,
    clock: Arc<dyn Clock>,
    stats: Arc<RwLock<RouterStats>>,
}

impl Pipeline {
    pub(crate) fn new(
        router: String,
        route: Arc<dyn Route>,
        classifier: OutcomeClassifier,
        dead_letter: DeadLetterForwarder,
        clock: Arc<dyn Clock>,
        stats: Arc<RwLock<RouterStats>>,
    ) -> Self {
        Self { router, route, classifier, dead_letter, clock, stats }
    }

    pub(crate) fn router(&self) -> &str {
        &self.router
    }

    pub(crate) fn policy(&self) -> &RetryPolicy {
        self.classifier.policy()
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn stats(&self) -> &Arc<RwLock<RouterStats>> {
        &self.stats
    }

    pub(crate) async fn record_accepted(&self) {
        self.stats.write().await.events_accepted += 1;
    }

    /// Runs attempt number `attempt` (1-based) for `event`.
    pub(crate) async fn attempt(&self, attempt: u32, event: Event) -> Outcome {
        let started = self.clock.now();
        {
            let mut stats = self.stats.write().await;
            stats.attempts += 1;
            stats.in_flight += 1;
        }

        debug!(
            router = %self.router,
            event_id = %event.id(),
            correlation_id = %event.correlation_id(),
            attempt,
            "invoking route"
        );

        let result = self.route.invoke(event.clone()).await;
        let outcome = self.classifier.classify(attempt, &event, result);
        let duration_ms =
            u64::try_from(self.clock.now().saturating_duration_since(started).as_millis())
                .unwrap_or(u64::MAX);

        {
            let mut stats = self.stats.write().await;
            stats.in_flight = stats.in_flight.saturating_sub(1);
            match &outcome {
                Outcome::Success { .. } => stats.successful_deliveries += 1,
                Outcome::TransientFailure { .. } => stats.failed_attempts += 1,
                Outcome::PermanentFailure { .. } => {
                    stats.failed_attempts += 1;
                    stats.permanent_failures += 1;
                },
            }
        }

        let max_attempts = self.policy().max_attempts();
        match &outcome {
            Outcome::Success { .. } => {
                debug!(
                    router = %self.router,
                    correlation_id = %event.correlation_id(),
                    attempt,
                    duration_ms,
                    "route succeeded"
                );
            },
            Outcome::TransientFailure { cause, .. } => {
                warn!(
                    router = %self.router,
                    correlation_id = %event.correlation_id(),
                    attempt,
                    max_attempts,
                    duration_ms,
                    cause = %cause,
                    "delivery attempt failed, retrying"
                );
            },
            Outcome::PermanentFailure { cause, .. } => {
                error!(
                    router = %self.router,
                    correlation_id = %event.correlation_id(),
                    attempt,
                    max_attempts,
                    cause = %cause,
                    "retries exhausted, abandoning event"
                );
            },
        }

        outcome
    }

    /// Hands an event that exhausted its retries to the dead-letter forwarder.
    pub(crate) async fn abandon(&self, event: Event, cause: &FailureCause) {
        if self.dead_letter.forward(event, cause).await == Disposition::Forwarded {
            self.stats.write().await.dead_lettered += 1;
        }
    }
}

/// The strategy a router was built with.
#[derive(Debug)]
pub(crate) enum ProcessingStrategy {
    Synchronous(SynchronousStrategy),
    Asynchronous(AsynchronousStrategy),
}

impl ProcessingStrategy {
    pub(crate) fn is_asynchronous(&self) -> bool {
        matches!(self, Self::Asynchronous(_))
    }

    pub(crate) async fn start(&self) -> Result<()> {
        match self {
            Self::Synchronous(_) => Ok(()),
            Self::Asynchronous(strategy) => strategy.start().await.map(|_| ()),
        }
    }

    pub(crate) async fn process(&self, event: Event) -> Result<Ack> {
        match self {
            Self::Synchronous(strategy) => Ok(strategy.process(event).await),
            Self::Asynchronous(strategy) => strategy.process(event).await,
        }
    }

    pub(crate) async fn has_active_workers(&self) -> bool {
        match self {
            Self::Synchronous(_) => false,
            Self::Asynchronous(strategy) => strategy.has_active_workers().await,
        }
    }

    pub(crate) async fn stop(&self) -> Result<()> {
        match self {
            Self::Synchronous(_) => Ok(()),
            Self::Asynchronous(strategy) => strategy.stop().await,
        }
    }
}
