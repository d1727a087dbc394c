//! Property-based checks for object store bookkeeping.

use std::collections::BTreeSet;

use chrono::Utc;
use proptest::prelude::*;
use steadfast_core::{Event, InMemoryObjectStore, ObjectStore, QueueKey, QueuedEvent};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After any interleaving of writes and removals the store holds exactly
    /// the keys that were written and not removed.
    #[test]
    fn store_tracks_live_keys(
        payloads in prop::collection::vec("[a-z]{1,8}", 1..20),
        removals in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let store = InMemoryObjectStore::new();
            let mut live = BTreeSet::new();
            let mut keys = Vec::new();

            for payload in &payloads {
                let event = Event::new(payload.clone());
                let key = QueueKey::for_event("prop", &event);
                store.store(key.clone(), QueuedEvent::new(event, Utc::now())).await.unwrap();
                live.insert(key.clone());
                keys.push(key);
            }

            for index in &removals {
                let key = index.get(&keys).clone();
                let existed = store.remove(key.clone()).await.unwrap();
                prop_assert_eq!(existed, live.remove(&key));
            }

            let listed: BTreeSet<_> = store.list_keys().await.unwrap().into_iter().collect();
            prop_assert_eq!(&listed, &live);
            prop_assert_eq!(store.count().await.unwrap(), live.len());
            Ok(())
        })?;
    }

    /// Recording failures never loses the event identity.
    #[test]
    fn failure_count_matches_recorded_failures(failures in 0_u32..50) {
        let event = Event::new("payload").with_correlation_id("corr");
        let mut entry = QueuedEvent::new(event.clone(), Utc::now());

        for attempt in 0..failures {
            let next = entry.event.with_payload(format!("attempt-{attempt}"));
            entry = entry.record_failure(next);
        }

        prop_assert_eq!(entry.failed_attempts, failures);
        prop_assert_eq!(entry.event.id(), event.id());
        prop_assert_eq!(entry.event.correlation_id().as_str(), "corr");
    }
}
