//! Worker pool management with structured concurrency.
//!
//! Owns the retry workers of one asynchronous router: spawns them, tracks
//! their join handles, and joins them on shutdown within a timeout.

use std::{sync::Arc, time::Duration};

use steadfast_core::ObjectStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{Result, RouterError},
    strategy::{KeyFeed, Pipeline},
    worker::RetryWorker,
};

/// Supervised set of retry workers sharing one key feed.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    worker_count: usize,
    store: Arc<dyn ObjectStore>,
    pipeline: Arc<Pipeline>,
    feed: KeyFeed,
    cancellation_token: CancellationToken,
    worker_handles: Vec<JoinHandle<Result<()>>>,
}

impl WorkerPool {
    pub(crate) fn new(
        worker_count: usize,
        store: Arc<dyn ObjectStore>,
        pipeline: Arc<Pipeline>,
        feed: KeyFeed,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            worker_count,
            store,
            pipeline,
            feed,
            cancellation_token,
            worker_handles: Vec::new(),
        }
    }

    /// Spawns every worker. Returns once all are spawned.
    pub(crate) async fn spawn_workers(&mut self) -> Result<()> {
        let router = self.pipeline.router().to_owned();
        info!(router = %router, worker_count = self.worker_count, "spawning retry workers");

        self.pipeline.stats().write().await.active_workers = self.worker_count;

        for worker_id in 0..self.worker_count {
            let worker = RetryWorker::new(
                worker_id,
                self.store.clone(),
                self.pipeline.clone(),
                self.feed.clone(),
                self.cancellation_token.clone(),
            );
            let router = router.clone();

            let handle = tokio::spawn(async move {
                info!(router = %router, worker_id, "retry worker starting");

                let result = worker.run().await;

                if let Err(ref error) = result {
                    error!(
                        router = %router,
                        worker_id,
                        error = %error,
                        "retry worker terminated with error"
                    );
                } else {
                    info!(router = %router, worker_id, "retry worker stopped gracefully");
                }

                result
            });

            self.worker_handles.push(handle);
        }

        Ok(())
    }

    /// Cancels the workers and waits up to `timeout` for them to finish.
    ///
    /// Attempts already running are allowed to complete. A panicked worker
    /// is reported as [`RouterError::WorkerPanic`] after every worker joined.
    pub(crate) async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!(
            worker_count = self.worker_handles.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "initiating graceful worker shutdown"
        );

        self.cancellation_token.cancel();

        let handles = std::mem::take(&mut self.worker_handles);
        let stats = self.pipeline.stats().clone();
        let shutdown_future = async move {
            let mut first_panic = None;

            for (worker_id, handle) in handles.into_iter().enumerate() {
                match handle.await {
                    Ok(Ok(())) => {},
                    Ok(Err(error)) => {
                        warn!(worker_id, error = %error, "worker completed with error during shutdown");
                    },
                    Err(join_error) => {
                        error!(worker_id, error = %join_error, "worker task panicked");
                        first_panic.get_or_insert(RouterError::WorkerPanic {
                            worker_id,
                            error: join_error.to_string(),
                        });
                    },
                }
            }

            stats.write().await.active_workers = 0;
            first_panic
        };

        match tokio::time::timeout(timeout, shutdown_future).await {
            Ok(None) => {
                info!("worker pool shutdown completed");
                Ok(())
            },
            Ok(Some(panic)) => Err(panic),
            Err(_elapsed) => {
                error!("worker shutdown timed out, some workers may still be running");
                Err(RouterError::ShutdownTimeout { timeout })
            },
        }
    }

    /// Returns true while any worker task is still running.
    pub(crate) fn has_active_workers(&self) -> bool {
        self.worker_handles.iter().any(|handle| !handle.is_finished())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let active_count = self.worker_handles.iter().filter(|h| !h.is_finished()).count();

        if active_count > 0 && !self.cancellation_token.is_cancelled() {
            error!(
                active_workers = active_count,
                "worker pool dropped with active workers, forcing cancellation"
            );
            self.cancellation_token.cancel();
            warn!("worker pool was not shut down gracefully, call shutdown_graceful before dropping");
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use steadfast_core::{Event, InMemoryObjectStore, TestClock};
    use tokio::sync::RwLock;

    use super::*;
    use crate::{
        dead_letter::DeadLetterForwarder,
        expression::BasicEvaluator,
        outcome::OutcomeClassifier,
        policy::RetryPolicy,
        route::{Route, RouteError},
        strategy::RouterStats,
    };

    #[derive(Debug)]
    struct Echo;

    #[async_trait]
    impl Route for Echo {
        async fn invoke(&self, event: Event) -> std::result::Result<Event, RouteError> {
            Ok(event)
        }
    }

    fn pool(worker_count: usize) -> (WorkerPool, Arc<tokio::sync::RwLock<RouterStats>>) {
        let stats = Arc::new(RwLock::new(RouterStats::default()));
        let classifier =
            OutcomeClassifier::new(RetryPolicy::default(), Arc::new(BasicEvaluator::new())).unwrap();
        let pipeline = Arc::new(Pipeline::new(
            "pool-test".into(),
            Arc::new(Echo),
            classifier,
            DeadLetterForwarder::default(),
            Arc::new(TestClock::new()),
            stats.clone(),
        ));
        let pool = WorkerPool::new(
            worker_count,
            Arc::new(InMemoryObjectStore::new()),
            pipeline,
            KeyFeed::new(),
            CancellationToken::new(),
        );
        (pool, stats)
    }

    #[tokio::test]
    async fn spawns_configured_number_of_workers() {
        let (mut pool, stats) = pool(4);

        pool.spawn_workers().await.unwrap();

        assert_eq!(pool.worker_handles.len(), 4);
        assert!(pool.has_active_workers());
        assert_eq!(stats.read().await.active_workers, 4);

        pool.shutdown_graceful(Duration::from_secs(1)).await.unwrap();
        assert_eq!(stats.read().await.active_workers, 0);
    }

    #[tokio::test]
    async fn idle_workers_stop_promptly() {
        let (mut pool, _stats) = pool(2);
        pool.spawn_workers().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let started = std::time::Instant::now();
        pool.shutdown_graceful(Duration::from_secs(3)).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn shutdown_without_workers_succeeds() {
        let (pool, _stats) = pool(3);

        assert!(!pool.has_active_workers());
        pool.shutdown_graceful(Duration::from_millis(1)).await.unwrap();
    }

    #[tokio::test]
    async fn dropping_a_running_pool_cancels_its_workers() {
        let (mut pool, _stats) = pool(1);
        let token = pool.cancellation_token.clone();
        pool.spawn_workers().await.unwrap();

        drop(pool);

        assert!(token.is_cancelled());
    }
}
