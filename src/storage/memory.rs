//! In-memory completion store.
//!
//! Each study or session constructs its own store, so tests get isolated
//! state. Does not persist data across restarts.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    sort_completions, Completion, CompletionKey, CompletionQuery, CompletionStore, InsertOutcome,
    Skip,
};
use crate::error::StorageResult;

/// In-memory implementation of [`CompletionStore`].
///
/// The existence check and the insert happen under one write lock, which
/// gives at-most-one successful insert per key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    completions: RwLock<HashMap<CompletionKey, Completion>>,
    skips: RwLock<HashMap<CompletionKey, Skip>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored completions.
    pub async fn len(&self) -> usize {
        self.completions.read().await.len()
    }

    /// Whether no completions are stored.
    pub async fn is_empty(&self) -> bool {
        self.completions.read().await.is_empty()
    }

    /// Drop every completion and skip.
    pub async fn clear(&self) {
        self.completions.write().await.clear();
        self.skips.write().await.clear();
    }
}

#[async_trait]
impl CompletionStore for MemoryStore {
    async fn insert_completion(&self, completion: &Completion) -> StorageResult<InsertOutcome> {
        let mut completions = self.completions.write().await;
        match completions.entry(completion.key.clone()) {
            Entry::Occupied(existing) => Ok(InsertOutcome::Duplicate(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(completion.clone());
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn get_completion(&self, key: &CompletionKey) -> StorageResult<Option<Completion>> {
        Ok(self.completions.read().await.get(key).cloned())
    }

    async fn find_completions(&self, query: &CompletionQuery) -> StorageResult<Vec<Completion>> {
        let mut found: Vec<Completion> = self
            .completions
            .read()
            .await
            .values()
            .filter(|c| query.matches(&c.key))
            .cloned()
            .collect();
        sort_completions(&mut found);
        Ok(found)
    }

    async fn insert_skip(&self, skip: &Skip) -> StorageResult<bool> {
        let mut skips = self.skips.write().await;
        match skips.entry(skip.key.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(skip.clone());
                Ok(true)
            }
        }
    }

    async fn delete_skip(&self, key: &CompletionKey) -> StorageResult<bool> {
        Ok(self.skips.write().await.remove(key).is_some())
    }

    async fn get_skip(&self, key: &CompletionKey) -> StorageResult<Option<Skip>> {
        Ok(self.skips.read().await.get(key).cloned())
    }

    async fn find_skips(&self, query: &CompletionQuery) -> StorageResult<Vec<Skip>> {
        let mut found: Vec<Skip> = self
            .skips
            .read()
            .await
            .values()
            .filter(|s| query.matches(&s.key))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.key
                .completion_date
                .cmp(&b.key.completion_date)
                .then(a.skipped_at.cmp(&b.skipped_at))
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(found)
    }
}
