use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use super::{ObjectStore, StoreFuture};
use crate::{
    error::CoreError,
    models::{QueueKey, QueuedEvent},
};

/// Non-durable object store holding entries in process memory.
///
/// Clones share the same entries, which lets a test keep a handle on the
/// store it gave a router and inspect it afterwards. Failures can be
/// injected to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    entries: Arc<RwLock<HashMap<QueueKey, Slot>>>,
    sequence: Arc<RwLock<u64>>,
    store_error: Arc<RwLock<Option<String>>>,
}

#[derive(Debug, Clone)]
struct Slot {
    written: u64,
    entry: QueuedEvent,
}

impl InMemoryObjectStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `store` call fail with `message`.
    pub async fn inject_store_error(&self, message: impl Into<String>) {
        *self.store_error.write().await = Some(message.into());
    }

    /// Clears a previously injected failure.
    pub async fn clear_store_error(&self) {
        *self.store_error.write().await = None;
    }

    /// Returns a copy of every entry, keyed by queue key.
    pub async fn snapshot(&self) -> HashMap<QueueKey, QueuedEvent> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(key, slot)| (key.clone(), slot.entry.clone()))
            .collect()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn store(&self, key: QueueKey, entry: QueuedEvent) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if let Some(message) = self.store_error.read().await.clone() {
                return Err(CoreError::Unavailable(message));
            }

            let written = {
                let mut sequence = self.sequence.write().await;
                *sequence += 1;
                *sequence
            };
            self.entries.write().await.insert(key, Slot { written, entry });
            Ok(())
        })
    }

    fn retrieve(&self, key: QueueKey) -> StoreFuture<'_, Option<QueuedEvent>> {
        Box::pin(async move {
            Ok(self.entries.read().await.get(&key).map(|slot| slot.entry.clone()))
        })
    }

    fn remove(&self, key: QueueKey) -> StoreFuture<'_, bool> {
        Box::pin(async move { Ok(self.entries.write().await.remove(&key).is_some()) })
    }

    fn list_keys(&self) -> StoreFuture<'_, Vec<QueueKey>> {
        Box::pin(async move {
            let entries = self.entries.read().await;
            let mut slots: Vec<_> = entries.iter().collect();
            slots.sort_by_key(|(_, slot)| slot.written);
            Ok(slots.into_iter().map(|(key, _)| key.clone()).collect())
        })
    }

    fn count(&self) -> StoreFuture<'_, usize> {
        Box::pin(async move { Ok(self.entries.read().await.len()) })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::Event;

    fn entry(payload: &str) -> (QueueKey, QueuedEvent) {
        let event = Event::new(payload.to_owned());
        (QueueKey::for_event("test", &event), QueuedEvent::new(event, Utc::now()))
    }

    #[tokio::test]
    async fn store_then_retrieve_returns_the_entry() {
        let store = InMemoryObjectStore::new();
        let (key, queued) = entry("a");

        store.store(key.clone(), queued.clone()).await.unwrap();

        assert_eq!(store.retrieve(key).await.unwrap(), Some(queued));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn store_replaces_existing_entry_under_the_same_key() {
        let store = InMemoryObjectStore::new();
        let (key, queued) = entry("a");

        store.store(key.clone(), queued.clone()).await.unwrap();
        let failed = queued.clone().record_failure(queued.event.with_payload("b"));
        store.store(key.clone(), failed.clone()).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.retrieve(key).await.unwrap(), Some(failed));
    }

    #[tokio::test]
    async fn list_keys_follows_write_order() {
        let store = InMemoryObjectStore::new();
        let (first, a) = entry("a");
        let (second, b) = entry("b");

        store.store(second.clone(), b).await.unwrap();
        store.store(first.clone(), a).await.unwrap();

        assert_eq!(store.list_keys().await.unwrap(), vec![second, first]);
    }

    #[tokio::test]
    async fn remove_reports_whether_the_key_existed() {
        let store = InMemoryObjectStore::new();
        let (key, queued) = entry("a");
        store.store(key.clone(), queued).await.unwrap();

        assert!(store.remove(key.clone()).await.unwrap());
        assert!(!store.remove(key.clone()).await.unwrap());
        assert_eq!(store.retrieve(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_error_fails_writes_until_cleared() {
        let store = InMemoryObjectStore::new();
        let (key, queued) = entry("a");
        store.inject_store_error("disk full").await;

        let error = store.store(key.clone(), queued.clone()).await.unwrap_err();
        assert!(matches!(error, CoreError::Unavailable(ref message) if message == "disk full"));
        assert_eq!(store.count().await.unwrap(), 0);

        store.clear_store_error().await;
        store.store(key, queued).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let store = InMemoryObjectStore::new();
        let handle = store.clone();
        let (key, queued) = entry("a");

        store.store(key.clone(), queued).await.unwrap();

        assert!(handle.snapshot().await.contains_key(&key));
    }
}
