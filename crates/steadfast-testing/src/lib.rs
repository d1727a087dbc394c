//! Test doubles and fixtures for exercising routers deterministically.
//!
//! [`TestEnv`] bundles a virtual clock, an in-memory object store, a
//! scripted route and a recording dead-letter destination, and hands out
//! router builders already wired to them.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use steadfast_core::{InMemoryObjectStore, ObjectStore, TestClock};
use steadfast_router::RouterBuilder;

pub mod destination;
pub mod fixtures;
pub mod route;

pub use destination::{FailingDestination, RecordingDestination};
pub use fixtures::{event_batch, EventBuilder};
pub use route::FlakyRoute;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Polls `condition` until it holds or `timeout` of real time passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Clock, store, route and dead-letter destination for one test.
#[derive(Debug, Clone)]
pub struct TestEnv {
    /// Virtual clock; retry waits complete instantly and are recorded.
    pub clock: TestClock,
    /// Object store handed to asynchronous routers.
    pub store: InMemoryObjectStore,
    /// Scripted downstream route.
    pub route: FlakyRoute,
    /// Dead-letter destination.
    pub dead_letter: RecordingDestination,
}

impl TestEnv {
    /// Creates an environment around `route`.
    pub fn new(route: FlakyRoute) -> Self {
        Self {
            clock: TestClock::new(),
            store: InMemoryObjectStore::new(),
            route,
            dead_letter: RecordingDestination::new(),
        }
    }

    /// Builder for a router that retries inline.
    pub fn synchronous_router(&self, name: &str) -> RouterBuilder {
        RouterBuilder::new(name)
            .route(Arc::new(self.route.clone()))
            .dead_letter(Arc::new(self.dead_letter.clone()))
            .clock(Arc::new(self.clock.clone()))
    }

    /// Builder for a router persisting to [`TestEnv::store`].
    pub fn asynchronous_router(&self, name: &str) -> RouterBuilder {
        self.synchronous_router(name).object_store(Arc::new(self.store.clone()))
    }

    /// Number of entries in the store.
    pub async fn stored(&self) -> usize {
        self.store.count().await.unwrap_or_default()
    }

    /// Waits until the store is empty.
    pub async fn wait_for_drain(&self, timeout: Duration) -> Result<()> {
        wait_until(timeout, || async { self.stored().await == 0 }).await
    }

    /// Waits until the dead-letter destination received `count` events.
    pub async fn wait_for_dead_letters(&self, count: usize, timeout: Duration) -> Result<()> {
        wait_until(timeout, || async { self.dead_letter.count().await >= count }).await
    }
}
