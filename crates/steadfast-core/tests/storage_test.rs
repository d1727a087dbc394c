//! Object store behavior shared by the in-memory and SQLite stores.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use steadfast_core::{
    Event, InMemoryObjectStore, ObjectStore, QueueKey, QueuedEvent, SqliteObjectStore,
};

fn pending(router: &str, payload: &str) -> (QueueKey, QueuedEvent) {
    let event = Event::new(payload.to_owned()).with_correlation_id(format!("corr-{payload}"));
    (QueueKey::for_event(router, &event), QueuedEvent::new(event, Utc::now()))
}

async fn exercise_basic_contract(store: Arc<dyn ObjectStore>) -> Result<()> {
    let (first, a) = pending("orders", "a");
    let (second, b) = pending("orders", "b");

    store.store(first.clone(), a.clone()).await?;
    store.store(second.clone(), b.clone()).await?;

    assert_eq!(store.count().await?, 2);
    assert_eq!(store.list_keys().await?, vec![first.clone(), second.clone()]);
    assert_eq!(store.retrieve(first.clone()).await?, Some(a.clone()));

    let retried = a.clone().record_failure(a.event.with_payload("a-rewritten"));
    store.store(first.clone(), retried.clone()).await?;
    assert_eq!(store.count().await?, 2);
    assert_eq!(store.retrieve(first.clone()).await?, Some(retried));

    assert!(store.remove(second.clone()).await?);
    assert!(!store.remove(second.clone()).await?);
    assert_eq!(store.retrieve(second).await?, None);
    assert_eq!(store.list_keys().await?, vec![first]);

    Ok(())
}

#[tokio::test]
async fn in_memory_store_honours_the_contract() -> Result<()> {
    exercise_basic_contract(Arc::new(InMemoryObjectStore::new())).await
}

#[tokio::test]
async fn sqlite_memory_store_honours_the_contract() -> Result<()> {
    exercise_basic_contract(Arc::new(SqliteObjectStore::in_memory().await?)).await
}

#[tokio::test]
async fn sqlite_file_store_honours_the_contract() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SqliteObjectStore::open(dir.path().join("queue.db")).await?;
    exercise_basic_contract(Arc::new(store)).await
}

#[tokio::test]
async fn sqlite_entries_survive_reopening_the_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("queue.db");
    let (key, entry) = pending("orders", "durable");
    let entry = entry.clone().record_failure(entry.event.clone());

    let store = SqliteObjectStore::open(&path).await?;
    store.store(key.clone(), entry.clone()).await?;
    store.close().await;
    drop(store);

    let reopened = SqliteObjectStore::open(&path).await?;
    assert_eq!(reopened.list_keys().await?, vec![key.clone()]);

    let recovered = reopened.retrieve(key).await?.expect("entry should survive reopen");
    assert_eq!(recovered, entry);
    assert_eq!(recovered.failed_attempts, 1);
    assert_eq!(recovered.event.correlation_id().as_str(), "corr-durable");

    Ok(())
}

#[tokio::test]
async fn keys_from_different_routers_do_not_collide() -> Result<()> {
    let store = SqliteObjectStore::in_memory().await?;
    let event = Event::new("shared");
    let billing = QueueKey::for_event("billing", &event);
    let shipping = QueueKey::for_event("shipping", &event);

    store.store(billing.clone(), QueuedEvent::new(event.clone(), Utc::now())).await?;
    store.store(shipping.clone(), QueuedEvent::new(event, Utc::now())).await?;

    let keys = store.list_keys().await?;
    assert_eq!(keys, vec![billing, shipping]);

    Ok(())
}
