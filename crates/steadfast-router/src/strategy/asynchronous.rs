use std::{sync::Arc, time::Duration};

use steadfast_core::{Event, ObjectStore, QueueKey, QueuedEvent};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Pipeline;
use crate::{
    error::{Result, RouterError},
    outcome::Ack,
    worker_pool::WorkerPool,
};

/// In-process queue of keys waiting for a worker.
///
/// Only keys travel through the feed; the event itself stays in the object
/// store, which remains the source of truth across restarts.
#[derive(Debug, Clone)]
pub(crate) struct KeyFeed {
    sender: mpsc::UnboundedSender<QueueKey>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<QueueKey>>>,
}

impl KeyFeed {
    pub(crate) fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver: Arc::new(Mutex::new(receiver)) }
    }

    pub(crate) fn push(&self, key: QueueKey) {
        if let Err(rejected) = self.sender.send(key) {
            warn!(queue_key = %rejected.0, "key feed closed, event stays in store until next start");
        }
    }

    /// Waits for the next key, or `None` once `token` is cancelled.
    pub(crate) async fn next(&self, token: &CancellationToken) -> Option<QueueKey> {
        let mut receiver = tokio::select! {
            guard = self.receiver.lock() => guard,
            () = token.cancelled() => return None,
        };

        tokio::select! {
            key = receiver.recv() => key,
            () = token.cancelled() => None,
        }
    }
}

/// Persists events and retries them on background workers.
///
/// `process` returns as soon as the event is durably stored. Workers pick
/// keys off the [`KeyFeed`], attempt delivery, and on failure store the
/// updated entry and re-queue the key after the retry wait.
#[derive(Debug)]
pub(crate) struct AsynchronousStrategy {
    store: Arc<dyn ObjectStore>,
    pipeline: Arc<Pipeline>,
    feed: KeyFeed,
    worker_count: usize,
    shutdown_timeout: Duration,
    cancellation_token: CancellationToken,
    worker_pool: Mutex<Option<WorkerPool>>,
}

impl AsynchronousStrategy {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        pipeline: Arc<Pipeline>,
        worker_count: usize,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            store,
            pipeline,
            feed: KeyFeed::new(),
            worker_count,
            shutdown_timeout,
            cancellation_token: CancellationToken::new(),
            worker_pool: Mutex::new(None),
        }
    }

    /// Queues every key found in the store, then starts workers.
    ///
    /// Returns the number of recovered events.
    pub(crate) async fn start(&self) -> Result<usize> {
        let router = self.pipeline.router();
        let keys = self.store.list_keys().await.map_err(|error| {
            error!(router, error = %error, "failed to enumerate object store during recovery");
            RouterError::from(error)
        })?;

        let recovered = keys.len();
        for key in keys {
            self.feed.push(key);
        }
        info!(router, recovered, "recovered pending events from object store");

        self.pipeline.stats().write().await.recovered_events +=
            u64::try_from(recovered).unwrap_or(u64::MAX);

        let mut pool = WorkerPool::new(
            self.worker_count,
            self.store.clone(),
            self.pipeline.clone(),
            self.feed.clone(),
            self.cancellation_token.clone(),
        );
        pool.spawn_workers().await?;
        *self.worker_pool.lock().await = Some(pool);

        Ok(recovered)
    }

    /// Stores `event` and queues it for a worker.
    pub(crate) async fn process(&self, event: Event) -> Result<Ack> {
        let key = QueueKey::for_event(self.pipeline.router(), &event);
        let entry = QueuedEvent::new(event, self.pipeline.clock().now_utc());

        self.store.store(key.clone(), entry).await.map_err(|error| {
            error!(
                queue_key = %key,
                error = %error,
                transient = error.is_transient(),
                "failed to persist event, rejecting it"
            );
            RouterError::from(error)
        })?;

        self.pipeline.record_accepted().await;
        debug!(queue_key = %key, "event persisted and queued");
        self.feed.push(key);

        Ok(Ack::NoContent)
    }

    pub(crate) async fn has_active_workers(&self) -> bool {
        self.worker_pool.lock().await.as_ref().is_some_and(WorkerPool::has_active_workers)
    }

    /// Cancels workers and pending retry timers, then waits for workers.
    pub(crate) async fn stop(&self) -> Result<()> {
        self.cancellation_token.cancel();

        let pool = self.worker_pool.lock().await.take();
        match pool {
            Some(pool) => pool.shutdown_graceful(self.shutdown_timeout).await,
            None => Ok(()),
        }
    }
}
