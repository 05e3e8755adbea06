//! Persistence for variables, collections and history.
//!
//! The pipeline only talks to the [`Storage`] trait. Two implementations
//! ship with the crate:
//!
//! - [`MemoryStorage`] keeps everything in process, for tests and embedding.
//! - [`FileStorage`] keeps JSON files in a data directory:
//!   `variables.json`, `collections.json` and `history.jsonl`.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::history::HistoryEntry;
use crate::models::Collection;
use crate::variables::{ScopeKey, Variable};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Async persistence used by the pipeline and its collaborators.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Reads one variable value from a persisted scope.
    async fn get_variable(&self, key: &ScopeKey, name: &str) -> Result<Option<String>, StorageError>;

    /// Writes one variable into a persisted scope.
    async fn set_variable(
        &self,
        key: &ScopeKey,
        name: &str,
        variable: &Variable,
    ) -> Result<(), StorageError>;

    /// Removes one variable from a persisted scope. Missing names are ignored.
    async fn unset_variable(&self, key: &ScopeKey, name: &str) -> Result<(), StorageError>;

    /// Reads every variable of a persisted scope.
    async fn load_variables(&self, key: &ScopeKey) -> Result<HashMap<String, Variable>, StorageError>;

    async fn get_collections(&self) -> Result<Vec<Collection>, StorageError>;

    /// Replaces all stored collections.
    async fn save_collections(&self, collections: &[Collection]) -> Result<(), StorageError>;

    /// History entries, oldest first.
    async fn get_history(&self) -> Result<Vec<HistoryEntry>, StorageError>;

    /// Appends an entry, then drops the oldest entries beyond `limit`.
    async fn append_history(&self, entry: HistoryEntry, limit: usize) -> Result<(), StorageError>;
}

/// Map key of a scope in the stored variables document.
pub(crate) fn scope_path(key: &ScopeKey) -> String {
    key.to_string()
}
