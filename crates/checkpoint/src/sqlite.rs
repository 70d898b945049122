//! SQLite store — one durable file, one row per thread.
//!
//! Schema:
//! - `checkpoints(thread_id TEXT PRIMARY KEY, state TEXT, saved_at TEXT)`
//!
//! `state` is the JSON-serialized `TurnState`; `saved_at` is RFC 3339.
//! Saving upserts, so the last writer for a thread wins.

use async_trait::async_trait;
use cachelm_core::checkpoint::{Checkpoint, CheckpointStore, ThreadId};
use cachelm_core::error::StoreError;
use cachelm_core::state::TurnState;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// A durable checkpoint store backed by a single SQLite file.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// Missing parent directories are created.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::Storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite checkpoint store initialized at {}", path.display());
        Ok(store)
    }

    /// An ephemeral database that lives as long as this value.
    ///
    /// Uses a single connection, since every SQLite `:memory:` connection
    /// is its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id  TEXT PRIMARY KEY NOT NULL,
                state      TEXT NOT NULL,
                saved_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("checkpoints table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_checkpoint(row: &sqlx::sqlite::SqliteRow) -> Result<Checkpoint, StoreError> {
        let thread_id: String = row
            .try_get("thread_id")
            .map_err(|e| StoreError::QueryFailed(format!("thread_id column: {e}")))?;
        let state_json: String = row
            .try_get("state")
            .map_err(|e| StoreError::QueryFailed(format!("state column: {e}")))?;
        let saved_at_str: String = row
            .try_get("saved_at")
            .map_err(|e| StoreError::QueryFailed(format!("saved_at column: {e}")))?;

        let state: TurnState = serde_json::from_str(&state_json).map_err(|e| {
            warn!(thread_id = %thread_id, error = %e, "Unreadable checkpoint state");
            StoreError::Corrupt {
                thread_id: thread_id.clone(),
                reason: e.to_string(),
            }
        })?;

        let saved_at = chrono::DateTime::parse_from_rfc3339(&saved_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Checkpoint {
            thread_id: ThreadId::new(thread_id),
            state,
            saved_at,
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>, StoreError> {
        let row = sqlx::query("SELECT thread_id, state, saved_at FROM checkpoints WHERE thread_id = ?1")
            .bind(thread_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT checkpoint: {e}")))?;

        debug!(thread_id = %thread_id, found = row.is_some(), "Loaded checkpoint");

        match row {
            Some(ref r) => Ok(Some(Self::row_to_checkpoint(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, thread_id: &ThreadId, state: &TurnState) -> Result<(), StoreError> {
        let state_json = serde_json::to_string(state)
            .map_err(|e| StoreError::Storage(format!("State serialization: {e}")))?;
        let saved_at = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO checkpoints (thread_id, state, saved_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(thread_id) DO UPDATE SET
                state = excluded.state,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(thread_id.as_str())
        .bind(&state_json)
        .bind(&saved_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPSERT failed: {e}")))?;

        debug!(thread_id = %thread_id, bytes = state_json.len(), "Saved checkpoint");
        Ok(())
    }

    async fn delete(&self, thread_id: &ThreadId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?1")
            .bind(thread_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE failed: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_threads(&self) -> Result<Vec<ThreadId>, StoreError> {
        let rows = sqlx::query("SELECT thread_id FROM checkpoints ORDER BY thread_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("LIST threads: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("thread_id")
                    .map(ThreadId::new)
                    .map_err(|e| StoreError::QueryFailed(format!("thread_id column: {e}")))
            })
            .collect()
    }
}
