//! Persistent queue store used by asynchronous routers.
//!
//! The [`ObjectStore`] trait is the only thing the asynchronous strategy
//! knows about persistence. Entries written here survive a router stop, and
//! every key still present when a router starts is treated as pending work.
//! Production deployments use [`SqliteObjectStore`]; tests and embedded
//! setups without durability needs use [`InMemoryObjectStore`].

use std::{fmt, future::Future, pin::Pin};

use crate::{
    error::Result,
    models::{QueueKey, QueuedEvent},
};

mod memory;
mod sqlite;

pub use memory::InMemoryObjectStore;
pub use sqlite::SqliteObjectStore;

/// Boxed future returned by [`ObjectStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Key-value persistence for pending events.
///
/// Implementations must be safe to share across worker tasks. A `store` for
/// an existing key replaces the previous entry, so each key holds at most
/// one pending event.
pub trait ObjectStore: Send + Sync + fmt::Debug + 'static {
    /// Writes `entry` under `key`, replacing any previous entry.
    fn store(&self, key: QueueKey, entry: QueuedEvent) -> StoreFuture<'_, ()>;

    /// Loads the entry under `key`, or `None` once it has been settled.
    fn retrieve(&self, key: QueueKey) -> StoreFuture<'_, Option<QueuedEvent>>;

    /// Deletes `key`, returning whether an entry was present.
    fn remove(&self, key: QueueKey) -> StoreFuture<'_, bool>;

    /// Lists every key currently held, oldest write first.
    fn list_keys(&self) -> StoreFuture<'_, Vec<QueueKey>>;

    /// Number of entries currently held.
    fn count(&self) -> StoreFuture<'_, usize>;
}
