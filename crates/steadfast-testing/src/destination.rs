//! Dead-letter destinations for tests.

use std::sync::Arc;

use async_trait::async_trait;
use steadfast_core::Event;
use steadfast_router::{DeadLetterDestination, RouteError};
use tokio::sync::Mutex;

/// Accepts and records every dead-lettered event.
#[derive(Debug, Clone, Default)]
pub struct RecordingDestination {
    delivered: Arc<Mutex<Vec<Event>>>,
}

impl RecordingDestination {
    /// Creates an empty destination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events delivered so far.
    pub async fn delivered(&self) -> Vec<Event> {
        self.delivered.lock().await.clone()
    }

    /// Number of events delivered so far.
    pub async fn count(&self) -> usize {
        self.delivered.lock().await.len()
    }
}

#[async_trait]
impl DeadLetterDestination for RecordingDestination {
    async fn deliver(&self, event: Event) -> Result<(), RouteError> {
        self.delivered.lock().await.push(event);
        Ok(())
    }
}

/// Rejects every event.
#[derive(Debug, Clone, Default)]
pub struct FailingDestination {
    attempts: Arc<Mutex<usize>>,
}

impl FailingDestination {
    /// Creates the destination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries attempted so far.
    pub async fn attempts(&self) -> usize {
        *self.attempts.lock().await
    }
}

#[async_trait]
impl DeadLetterDestination for FailingDestination {
    async fn deliver(&self, _event: Event) -> Result<(), RouteError> {
        *self.attempts.lock().await += 1;
        Err(RouteError::unreachable("dead-letter destination is down"))
    }
}
