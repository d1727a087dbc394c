use std::sync::Arc;

use steadfast_core::Event;

use super::Pipeline;
use crate::outcome::{Ack, Outcome};

/// Retries inline on the caller's task.
///
/// `process` returns only once the event succeeded or was abandoned, so the
/// caller waits through every retry. Nothing is persisted.
#[derive(Debug)]
pub(crate) struct SynchronousStrategy {
    pipeline: Arc<Pipeline>,
}

impl SynchronousStrategy {
    pub(crate) fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    pub(crate) async fn process(&self, event: Event) -> Ack {
        self.pipeline.record_accepted().await;
        let wait = self.pipeline.policy().wait_between_retries();

        let mut current = event;
        let mut attempt = 0_u32;
        loop {
            attempt += 1;
            match self.pipeline.attempt(attempt, current).await {
                Outcome::Success { ack, .. } => return ack,
                Outcome::TransientFailure { event, .. } => {
                    self.pipeline.clock().sleep(wait).await;
                    current = event;
                },
                Outcome::PermanentFailure { event, cause } => {
                    self.pipeline.abandon(event, &cause).await;
                    return Ack::NoContent;
                },
            }
        }
    }
}
