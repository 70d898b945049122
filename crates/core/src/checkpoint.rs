//! Checkpoint trait — per-thread snapshots of turn state.
//!
//! A checkpoint holds the full [`TurnState`] saved at the end of a turn.
//! Only `messages` is read back on restore; the turn-scoped fields are
//! re-initialized by the orchestrator regardless.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::state::TurnState;

/// Identifier of a persisted conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A saved snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: ThreadId,
    pub state: TurnState,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(thread_id: ThreadId, state: TurnState) -> Self {
        Self {
            thread_id,
            state,
            saved_at: Utc::now(),
        }
    }
}

/// The core CheckpointStore trait.
///
/// Implementations: in-memory (process lifetime), SQLite (single file).
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The backend name (e.g., "memory", "sqlite").
    fn name(&self) -> &str;

    /// Latest snapshot for a thread, if any.
    async fn load(&self, thread_id: &ThreadId) -> std::result::Result<Option<Checkpoint>, StoreError>;

    /// Replace the snapshot for a thread.
    async fn save(&self, thread_id: &ThreadId, state: &TurnState) -> std::result::Result<(), StoreError>;

    /// Remove a thread. Returns whether anything was deleted.
    async fn delete(&self, thread_id: &ThreadId) -> std::result::Result<bool, StoreError>;

    /// All persisted thread ids, sorted.
    async fn list_threads(&self) -> std::result::Result<Vec<ThreadId>, StoreError>;
}
