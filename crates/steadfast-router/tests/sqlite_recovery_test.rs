//! Crash recovery against a durable store.
//!
//! One router persists an event that keeps failing and is stopped while the
//! event waits for its retry. A second router opened on the same database
//! file resumes it with the attempt count intact.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use steadfast_core::{ObjectStore, QueueKey, RealClock, SqliteObjectStore, TestClock};
use steadfast_router::RouterBuilder;
use steadfast_testing::{wait_until, EventBuilder, FlakyRoute, RecordingDestination};

const SETTLE: Duration = Duration::from_secs(10);

#[tokio::test]
async fn second_router_resumes_events_left_by_the_first() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("queue.db");
    let event = EventBuilder::new().correlation_id("survivor").payload("keep me").build();
    let key = QueueKey::for_event("orders", &event);

    let first_store = Arc::new(SqliteObjectStore::open(&path).await?);
    let failing = FlakyRoute::always_failing();
    let first = RouterBuilder::new("orders")
        .route(Arc::new(failing.clone()))
        .object_store(first_store.clone())
        .clock(Arc::new(RealClock::new()))
        .max_retries(3)
        .seconds_between_retries(3600)
        .build()?;
    first.start().await?;
    first.process(event.clone()).await?;

    wait_until(SETTLE, || async {
        matches!(first_store.retrieve(key.clone()).await, Ok(Some(entry)) if entry.failed_attempts == 1)
    })
    .await?;
    first.stop().await?;
    first_store.close().await;
    assert_eq!(failing.invocations(), 1);

    let second_store = Arc::new(SqliteObjectStore::open(&path).await?);
    let recovering = FlakyRoute::succeeding();
    let dead_letter = RecordingDestination::new();
    let second = RouterBuilder::new("orders")
        .route(Arc::new(recovering.clone()))
        .dead_letter(Arc::new(dead_letter.clone()))
        .object_store(second_store.clone())
        .clock(Arc::new(TestClock::new()))
        .max_retries(3)
        .build()?;
    second.start().await?;

    wait_until(SETTLE, || async { second_store.count().await.unwrap_or(1) == 0 }).await?;
    let received = recovering.received().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].id(), event.id());
    assert_eq!(received[0].payload_text(), "keep me");
    assert_eq!(dead_letter.count().await, 0);
    assert_eq!(second.stats().await.recovered_events, 1);

    second.stop().await?;
    Ok(())
}

#[tokio::test]
async fn exhausted_budget_carries_over_the_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("queue.db");
    let event = EventBuilder::new().build();
    let key = QueueKey::for_event("orders", &event);

    let first_store = Arc::new(SqliteObjectStore::open(&path).await?);
    let first = RouterBuilder::new("orders")
        .route(Arc::new(FlakyRoute::always_failing()))
        .object_store(first_store.clone())
        .clock(Arc::new(RealClock::new()))
        .max_retries(1)
        .seconds_between_retries(3600)
        .build()?;
    first.start().await?;
    first.process(event).await?;
    wait_until(SETTLE, || async {
        matches!(first_store.retrieve(key.clone()).await, Ok(Some(entry)) if entry.failed_attempts == 1)
    })
    .await?;
    first.stop().await?;
    first_store.close().await;

    let second_store = Arc::new(SqliteObjectStore::open(&path).await?);
    let still_failing = FlakyRoute::always_failing();
    let dead_letter = RecordingDestination::new();
    let second = RouterBuilder::new("orders")
        .route(Arc::new(still_failing.clone()))
        .dead_letter(Arc::new(dead_letter.clone()))
        .object_store(second_store.clone())
        .clock(Arc::new(TestClock::new()))
        .max_retries(1)
        .build()?;
    second.start().await?;

    wait_until(SETTLE, || async { dead_letter.count().await == 1 }).await?;
    wait_until(SETTLE, || async { second_store.count().await.unwrap_or(1) == 0 }).await?;
    assert_eq!(still_failing.invocations(), 1);

    second.stop().await?;
    Ok(())
}
