//! Core domain models, clock abstraction, and queue persistence.
//!
//! Provides the event types every router handles, the [`Clock`] used for
//! retry waits, and the [`ObjectStore`] abstraction that lets asynchronous
//! routers survive restarts.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{CorrelationId, Event, EventId, QueueKey, QueuedEvent};
pub use storage::{InMemoryObjectStore, ObjectStore, SqliteObjectStore, StoreFuture};
pub use time::{Clock, RealClock, TestClock};
