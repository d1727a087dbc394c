//! Scripted downstream route.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use steadfast_core::{CorrelationId, Event};
use steadfast_router::{Route, RouteError};
use tokio::sync::Mutex;

#[derive(Debug)]
struct Script {
    failures_remaining: Option<u32>,
    error: RouteError,
    reply: Option<Bytes>,
    relabel: Option<CorrelationId>,
    received: Vec<Event>,
}

impl Script {
    fn answer(&self, event: Event) -> Event {
        let payload = self.reply.clone().unwrap_or_else(|| event.payload().clone());
        match &self.relabel {
            Some(correlation_id) => Event::new(payload).with_correlation_id(correlation_id.clone()),
            None => event.with_payload(payload),
        }
    }
}

/// Route that fails a scripted number of times, then succeeds.
///
/// Clones share the script and the record of received events, so a test
/// can keep one handle while the router owns another.
#[derive(Debug, Clone)]
pub struct FlakyRoute {
    script: Arc<Mutex<Script>>,
    invocations: Arc<AtomicUsize>,
}

impl FlakyRoute {
    fn with_failures(failures_remaining: Option<u32>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                failures_remaining,
                error: RouteError::rejected(500, "scripted failure"),
                reply: None,
                relabel: None,
                received: Vec::new(),
            })),
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fails the first `failures` invocations, then echoes the event back.
    pub fn failing(failures: u32) -> Self {
        Self::with_failures(Some(failures))
    }

    /// Fails every invocation.
    pub fn always_failing() -> Self {
        Self::with_failures(None)
    }

    /// Echoes every event back.
    pub fn succeeding() -> Self {
        Self::failing(0)
    }

    /// Replaces the payload of successful results with `payload`.
    #[must_use]
    pub fn replying_with(self, payload: impl Into<Bytes>) -> Self {
        if let Ok(mut script) = self.script.try_lock() {
            script.reply = Some(payload.into());
        }
        self
    }

    /// Answers successful invocations with a brand-new event carrying
    /// `correlation_id`, as a route that rebuilds its output would.
    #[must_use]
    pub fn relabeling(self, correlation_id: impl Into<CorrelationId>) -> Self {
        if let Ok(mut script) = self.script.try_lock() {
            script.relabel = Some(correlation_id.into());
        }
        self
    }

    /// Error returned by failing invocations.
    #[must_use]
    pub fn failing_with(self, error: RouteError) -> Self {
        if let Ok(mut script) = self.script.try_lock() {
            script.error = error;
        }
        self
    }

    /// Number of invocations so far.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Every event received, in call order.
    pub async fn received(&self) -> Vec<Event> {
        self.script.lock().await.received.clone()
    }
}

#[async_trait]
impl Route for FlakyRoute {
    async fn invoke(&self, event: Event) -> Result<Event, RouteError> {
        let mut script = self.script.lock().await;
        script.received.push(event.clone());
        self.invocations.fetch_add(1, Ordering::SeqCst);

        match script.failures_remaining {
            None => Err(script.error.clone()),
            Some(0) => Ok(script.answer(event)),
            Some(remaining) => {
                script.failures_remaining = Some(remaining - 1);
                Err(script.error.clone())
            },
        }
    }
}
