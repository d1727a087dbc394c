//! Background worker for asynchronous routers.
//!
//! A worker takes a key off the feed, loads the entry, runs one attempt and
//! settles the entry: removed on success or abandonment, re-stored and
//! re-queued after the retry wait on transient failure. Retry waits run on
//! detached timer tasks so a waiting event never occupies a worker.

use std::sync::Arc;

use steadfast_core::{ObjectStore, QueueKey};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::Result,
    outcome::Outcome,
    strategy::{KeyFeed, Pipeline},
};

/// Worker driving queued events through the attempt pipeline.
#[derive(Debug)]
pub(crate) struct RetryWorker {
    id: usize,
    store: Arc<dyn ObjectStore>,
    pipeline: Arc<Pipeline>,
    feed: KeyFeed,
    cancellation_token: CancellationToken,
}

impl RetryWorker {
    pub(crate) fn new(
        id: usize,
        store: Arc<dyn ObjectStore>,
        pipeline: Arc<Pipeline>,
        feed: KeyFeed,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self { id, store, pipeline, feed, cancellation_token }
    }

    /// Processes keys until cancelled.
    ///
    /// A key whose processing fails is logged and dropped from the feed; its
    /// entry stays in the store and is picked up again at the next start.
    pub(crate) async fn run(&self) -> Result<()> {
        loop {
            let Some(key) = self.feed.next(&self.cancellation_token).await else {
                info!(worker_id = self.id, "retry worker received shutdown signal");
                break;
            };

            if let Err(error) = self.process_key(key.clone()).await {
                error!(
                    worker_id = self.id,
                    queue_key = %key,
                    error = %error,
                    "queued event processing failed, leaving it for recovery"
                );
            }
        }

        Ok(())
    }

    async fn process_key(&self, key: QueueKey) -> Result<()> {
        let Some(entry) = self.store.retrieve(key.clone()).await? else {
            debug!(worker_id = self.id, queue_key = %key, "entry already settled, skipping");
            return Ok(());
        };

        let attempt = entry.next_attempt();
        match self.pipeline.attempt(attempt, entry.event.clone()).await {
            Outcome::Success { .. } => {
                self.store.remove(key.clone()).await?;
                debug!(worker_id = self.id, queue_key = %key, attempt, "queued event delivered");
            },
            Outcome::TransientFailure { event, .. } => {
                // The retry runs either way; a failed write only leaves the
                // previous entry, and its attempt count, in place.
                if let Err(error) = self.store.store(key.clone(), entry.record_failure(event)).await {
                    warn!(
                        worker_id = self.id,
                        queue_key = %key,
                        error = %error,
                        "failed to persist failed attempt, retrying from the previous entry"
                    );
                }
                self.schedule_retry(key);
            },
            Outcome::PermanentFailure { event, cause } => {
                self.pipeline.abandon(event, &cause).await;
                self.store.remove(key).await?;
            },
        }

        Ok(())
    }

    /// Re-queues `key` once the retry wait has passed.
    ///
    /// Cancellation abandons the timer; the key stays in the store.
    fn schedule_retry(&self, key: QueueKey) {
        let wait = self.pipeline.policy().wait_between_retries();
        let clock = self.pipeline.clock().clone();
        let feed = self.feed.clone();
        let token = self.cancellation_token.clone();
        let worker_id = self.id;

        debug!(
            worker_id,
            queue_key = %key,
            wait_ms = self.pipeline.policy().millis_between_retries(),
            "retry scheduled"
        );

        tokio::spawn(async move {
            tokio::select! {
                () = clock.sleep(wait) => feed.push(key),
                () = token.cancelled() => {
                    debug!(worker_id, queue_key = %key, "retry timer cancelled, key kept for recovery");
                },
            }
        });
    }
}
