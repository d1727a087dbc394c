use std::{path::Path, str::FromStr, time::Duration};

use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use tracing::{debug, instrument};

use super::{ObjectStore, StoreFuture};
use crate::{
    error::Result,
    models::{QueueKey, QueuedEvent},
};

const DEFAULT_MAX_CONNECTIONS: u32 = 4;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS queued_events (
    queue_key  TEXT PRIMARY KEY NOT NULL,
    entry      TEXT NOT NULL,
    written_at TEXT NOT NULL,
    sequence   INTEGER NOT NULL
)";

/// Durable object store backed by a SQLite database file.
///
/// Each entry is a JSON-encoded [`QueuedEvent`] in a single table. Writes
/// use WAL journaling with full synchronous mode so an acknowledged `store`
/// survives a process crash.
#[derive(Debug, Clone)]
pub struct SqliteObjectStore {
    pool: SqlitePool,
}

impl SqliteObjectStore {
    /// Opens or creates the database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Opens a private in-memory database, useful for tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // One connection that never recycles, otherwise the database vanishes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Wraps an existing pool, creating the table if needed.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        debug!("sqlite object store ready");
        Ok(Self { pool })
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl ObjectStore for SqliteObjectStore {
    fn store(&self, key: QueueKey, entry: QueuedEvent) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let encoded = serde_json::to_string(&entry)?;

            sqlx::query(
                r"
                INSERT INTO queued_events (queue_key, entry, written_at, sequence)
                VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(sequence), 0) + 1 FROM queued_events))
                ON CONFLICT (queue_key) DO UPDATE SET
                    entry = excluded.entry,
                    written_at = excluded.written_at,
                    sequence = excluded.sequence
                ",
            )
            .bind(key.as_str())
            .bind(encoded)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

            Ok(())
        })
    }

    fn retrieve(&self, key: QueueKey) -> StoreFuture<'_, Option<QueuedEvent>> {
        Box::pin(async move {
            let encoded: Option<String> =
                sqlx::query_scalar("SELECT entry FROM queued_events WHERE queue_key = ?1")
                    .bind(key.as_str())
                    .fetch_optional(&self.pool)
                    .await?;

            match encoded {
                Some(encoded) => Ok(Some(serde_json::from_str(&encoded)?)),
                None => Ok(None),
            }
        })
    }

    fn remove(&self, key: QueueKey) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM queued_events WHERE queue_key = ?1")
                .bind(key.as_str())
                .execute(&self.pool)
                .await?;

            Ok(result.rows_affected() > 0)
        })
    }

    fn list_keys(&self) -> StoreFuture<'_, Vec<QueueKey>> {
        Box::pin(async move {
            let keys: Vec<String> =
                sqlx::query_scalar("SELECT queue_key FROM queued_events ORDER BY sequence")
                    .fetch_all(&self.pool)
                    .await?;

            Ok(keys.into_iter().map(QueueKey::from_raw).collect())
        })
    }

    fn count(&self) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queued_events")
                .fetch_one(&self.pool)
                .await?;

            Ok(usize::try_from(count).unwrap_or_default())
        })
    }
}
