//! In-memory store — snapshots live as long as the process.

use async_trait::async_trait;
use cachelm_core::checkpoint::{Checkpoint, CheckpointStore, ThreadId};
use cachelm_core::error::StoreError;
use cachelm_core::state::TurnState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps snapshots in a map keyed by thread id.
///
/// Clones share the same map.
#[derive(Clone)]
pub struct InMemoryStore {
    checkpoints: Arc<RwLock<HashMap<ThreadId, Checkpoint>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            checkpoints: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.checkpoints.read().await.get(thread_id).cloned())
    }

    async fn save(&self, thread_id: &ThreadId, state: &TurnState) -> Result<(), StoreError> {
        let checkpoint = Checkpoint::new(thread_id.clone(), state.clone());
        self.checkpoints
            .write()
            .await
            .insert(thread_id.clone(), checkpoint);
        Ok(())
    }

    async fn delete(&self, thread_id: &ThreadId) -> Result<bool, StoreError> {
        Ok(self.checkpoints.write().await.remove(thread_id).is_some())
    }

    async fn list_threads(&self) -> Result<Vec<ThreadId>, StoreError> {
        let mut ids: Vec<ThreadId> = self.checkpoints.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
