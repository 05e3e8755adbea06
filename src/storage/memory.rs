//! In-process storage.

use super::{scope_path, Storage, StorageError};
use crate::history::HistoryEntry;
use crate::models::Collection;
use crate::variables::{ScopeKey, Variable};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    variables: HashMap<String, HashMap<String, Variable>>,
    collections: Vec<Collection>,
    history: Vec<HistoryEntry>,
}

/// [`Storage`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage pre-filled with collections.
    pub fn with_collections(collections: Vec<Collection>) -> Self {
        let storage = Self::new();
        storage.lock().collections = collections;
        storage
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_variable(&self, key: &ScopeKey, name: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .lock()
            .variables
            .get(&scope_path(key))
            .and_then(|scope| scope.get(name))
            .map(|variable| variable.value.clone()))
    }

    async fn set_variable(
        &self,
        key: &ScopeKey,
        name: &str,
        variable: &Variable,
    ) -> Result<(), StorageError> {
        self.lock()
            .variables
            .entry(scope_path(key))
            .or_default()
            .insert(name.to_string(), variable.clone());
        Ok(())
    }

    async fn unset_variable(&self, key: &ScopeKey, name: &str) -> Result<(), StorageError> {
        if let Some(scope) = self.lock().variables.get_mut(&scope_path(key)) {
            scope.remove(name);
        }
        Ok(())
    }

    async fn load_variables(&self, key: &ScopeKey) -> Result<HashMap<String, Variable>, StorageError> {
        Ok(self
            .lock()
            .variables
            .get(&scope_path(key))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_collections(&self) -> Result<Vec<Collection>, StorageError> {
        Ok(self.lock().collections.clone())
    }

    async fn save_collections(&self, collections: &[Collection]) -> Result<(), StorageError> {
        self.lock().collections = collections.to_vec();
        Ok(())
    }

    async fn get_history(&self) -> Result<Vec<HistoryEntry>, StorageError> {
        Ok(self.lock().history.clone())
    }

    async fn append_history(&self, entry: HistoryEntry, limit: usize) -> Result<(), StorageError> {
        let mut state = self.lock();
        state.history.push(entry);
        let excess = state.history.len().saturating_sub(limit);
        if excess > 0 {
            state.history.drain(..excess);
        }
        Ok(())
    }
}
