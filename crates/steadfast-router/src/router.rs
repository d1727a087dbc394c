//! The until-successful router and its builder.
//!
//! A [`Router`] is built once with [`RouterBuilder`], started, fed events
//! with [`Router::process`], and stopped. Configuring an object store selects
//! the asynchronous strategy; otherwise the router retries inline.
//!
//! ```ignore
//! let router = RouterBuilder::new("orders")
//!     .route(Arc::new(http_route))
//!     .max_retries(3)
//!     .millis_between_retries(500)
//!     .build()?;
//! router.start().await?;
//! let ack = router.process(Event::new("payload")).await?;
//! router.stop().await?;
//! ```

use std::{fmt, sync::Arc, time::Duration};

use steadfast_core::{Clock, Event, ObjectStore, RealClock};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    dead_letter::DeadLetterForwarder,
    error::{Result, RouterError},
    expression::{BasicEvaluator, ExpressionEvaluator},
    outcome::{Ack, OutcomeClassifier},
    policy::{RetryPolicy, RetrySettings},
    route::{DeadLetterDestination, Route},
    strategy::{AsynchronousStrategy, Pipeline, ProcessingStrategy, RouterStats, SynchronousStrategy},
};

/// Workers spawned by an asynchronous router unless configured otherwise.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Time `stop` waits for asynchronous workers unless configured otherwise.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle state of a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    /// Built but not yet started.
    Configured,
    /// Accepting events.
    Started,
    /// Stopped for good.
    Stopped,
}

impl fmt::Display for RouterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Configured => "configured",
            Self::Started => "started",
            Self::Stopped => "stopped",
        };
        f.write_str(state)
    }
}

/// Builder for [`Router`].
#[derive(Debug)]
pub struct RouterBuilder {
    name: String,
    settings: RetrySettings,
    route: Option<Arc<dyn Route>>,
    object_store: Option<Arc<dyn ObjectStore>>,
    dead_letter: Option<Arc<dyn DeadLetterDestination>>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    clock: Arc<dyn Clock>,
    worker_count: usize,
    shutdown_timeout: Duration,
}

impl RouterBuilder {
    /// Starts a builder for a router called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: RetrySettings::default(),
            route: None,
            object_store: None,
            dead_letter: None,
            evaluator: Arc::new(BasicEvaluator::new()),
            clock: Arc::new(RealClock::new()),
            worker_count: DEFAULT_WORKER_COUNT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Replaces all retry settings at once.
    #[must_use]
    pub fn settings(mut self, settings: RetrySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Retries after the initial attempt.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.settings.max_retries = max_retries;
        self
    }

    /// Wait between attempts in milliseconds.
    #[must_use]
    pub fn millis_between_retries(mut self, millis: u64) -> Self {
        self.settings.millis_between_retries = Some(millis);
        self
    }

    /// Wait between attempts in seconds.
    #[must_use]
    pub fn seconds_between_retries(mut self, seconds: u64) -> Self {
        self.settings.seconds_between_retries = Some(seconds);
        self
    }

    /// Expression producing the acknowledgement.
    #[must_use]
    pub fn ack_expression(mut self, expression: impl Into<String>) -> Self {
        self.settings.ack_expression = Some(expression.into());
        self
    }

    /// Expression marking returned events as failed.
    #[must_use]
    pub fn failure_expression(mut self, expression: impl Into<String>) -> Self {
        self.settings.failure_expression = Some(expression.into());
        self
    }

    /// Downstream route to retry. Required.
    #[must_use]
    pub fn route(mut self, route: Arc<dyn Route>) -> Self {
        self.route = Some(route);
        self
    }

    /// Persistent store; selects the asynchronous strategy.
    #[must_use]
    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Destination for events that exhaust their retries.
    #[must_use]
    pub fn dead_letter(mut self, destination: Arc<dyn DeadLetterDestination>) -> Self {
        self.dead_letter = Some(destination);
        self
    }

    /// Evaluator for ack and failure expressions.
    #[must_use]
    pub fn evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Clock used for retry waits and timestamps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Workers spawned by an asynchronous router.
    #[must_use]
    pub fn worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Time `stop` waits for asynchronous workers.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Validates the configuration and builds the router.
    ///
    /// Every configuration problem surfaces here, never at `process` time.
    pub fn build(self) -> Result<Router> {
        if self.name.trim().is_empty() {
            return Err(RouterError::configuration("router name must not be empty"));
        }
        let route = self
            .route
            .ok_or_else(|| RouterError::configuration(format!("router {} has no route", self.name)))?;
        if self.object_store.is_some() && self.worker_count == 0 {
            return Err(RouterError::configuration("worker_count must be at least 1"));
        }

        let policy = RetryPolicy::from_settings(&self.settings)?;
        let classifier = OutcomeClassifier::new(policy.clone(), self.evaluator)?;
        let dead_letter = DeadLetterForwarder::new(self.dead_letter);
        let has_dead_letter = dead_letter.is_configured();
        let stats = Arc::new(RwLock::new(RouterStats::default()));
        let pipeline = Arc::new(Pipeline::new(
            self.name.clone(),
            route,
            classifier,
            dead_letter,
            self.clock,
            stats.clone(),
        ));

        let strategy = match self.object_store {
            Some(store) => ProcessingStrategy::Asynchronous(AsynchronousStrategy::new(
                store,
                pipeline,
                self.worker_count,
                self.shutdown_timeout,
            )),
            None => ProcessingStrategy::Synchronous(SynchronousStrategy::new(pipeline)),
        };

        debug!(
            router = %self.name,
            asynchronous = strategy.is_asynchronous(),
            max_retries = policy.max_retries(),
            millis_between_retries = policy.millis_between_retries(),
            dead_letter = has_dead_letter,
            "router configured"
        );

        Ok(Router {
            name: self.name,
            policy,
            strategy,
            state: RwLock::new(RouterState::Configured),
            stats,
        })
    }
}

/// Retry-until-success router.
#[derive(Debug)]
pub struct Router {
    name: String,
    policy: RetryPolicy,
    strategy: ProcessingStrategy,
    state: RwLock<RouterState>,
    stats: Arc<RwLock<RouterStats>>,
}

impl Router {
    /// Starts a builder for a router called `name`.
    pub fn builder(name: impl Into<String>) -> RouterBuilder {
        RouterBuilder::new(name)
    }

    /// Router name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validated retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Effective wait between attempts in milliseconds.
    pub fn millis_between_retries(&self) -> u64 {
        self.policy.millis_between_retries()
    }

    /// Returns true if the router persists events and retries in the background.
    pub fn is_asynchronous(&self) -> bool {
        self.strategy.is_asynchronous()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> RouterState {
        *self.state.read().await
    }

    /// Returns true while background workers of an asynchronous router run.
    pub async fn has_active_workers(&self) -> bool {
        self.strategy.has_active_workers().await
    }

    /// Snapshot of the router counters.
    pub async fn stats(&self) -> RouterStats {
        self.stats.read().await.clone()
    }

    /// Starts the router.
    ///
    /// An asynchronous router first queues every event left in its store,
    /// then spawns its workers. Calls to `process` made meanwhile wait until
    /// start completes.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;
        match *state {
            RouterState::Configured => {},
            RouterState::Started => return Err(RouterError::AlreadyStarted { name: self.name.clone() }),
            RouterState::Stopped => return Err(RouterError::Stopped { name: self.name.clone() }),
        }

        self.strategy.start().await?;
        *state = RouterState::Started;

        info!(router = %self.name, asynchronous = self.is_asynchronous(), "router started");
        Ok(())
    }

    /// Submits an event.
    ///
    /// A synchronous router returns once the event succeeded, with the ack
    /// expression's value, or was abandoned, with [`Ack::NoContent`]. An
    /// asynchronous router returns [`Ack::NoContent`] as soon as the event is
    /// stored. Downstream failures never surface here.
    pub async fn process(&self, event: Event) -> Result<Ack> {
        match *self.state.read().await {
            RouterState::Started => {},
            RouterState::Configured => return Err(RouterError::NotStarted { name: self.name.clone() }),
            RouterState::Stopped => return Err(RouterError::Stopped { name: self.name.clone() }),
        }

        self.strategy.process(event).await
    }

    /// Stops the router. Idempotent.
    ///
    /// Asynchronous workers finish their current attempt and exit; events
    /// waiting for a retry stay in the store for the next start.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if *state == RouterState::Stopped {
            return Ok(());
        }
        let was_started = *state == RouterState::Started;
        *state = RouterState::Stopped;
        drop(state);

        if was_started {
            self.strategy.stop().await?;
        }

        info!(router = %self.name, "router stopped");
        Ok(())
    }
}
