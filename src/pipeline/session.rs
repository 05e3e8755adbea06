//! Per-editor-context state threaded through the pipeline.

use crate::models::Collection;
use crate::storage::{Storage, StorageError};
use crate::variables::{ScopeKey, VariableStore};

/// The variables and selections of one editor context.
///
/// A session is passed to [`Orchestrator::send`](super::Orchestrator::send)
/// by mutable reference, so one session never runs two sends at once.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub store: VariableStore,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing store.
    pub fn with_store(store: VariableStore) -> Self {
        Self { store }
    }

    /// Builds a session from persisted variables.
    ///
    /// Loads the global scope, the scope of `environment` when given and the
    /// scope of `collection` when given. Collection variables defined on the
    /// collection itself are used as defaults under the persisted ones.
    pub async fn load(
        storage: &dyn Storage,
        environment: Option<&str>,
        collection: Option<&Collection>,
    ) -> Result<Self, StorageError> {
        let mut store = VariableStore::new();
        store.load_scope(ScopeKey::Global, storage.load_variables(&ScopeKey::Global).await?);

        if let Some(environment) = environment {
            let key = ScopeKey::Environment(environment.to_string());
            let variables = storage.load_variables(&key).await?;
            log::debug!(
                "Loaded {} variables for environment '{}'",
                variables.len(),
                environment
            );
            store.load_scope(key, variables);
            store.set_active_environment(Some(environment.to_string()));
        }

        if let Some(collection) = collection {
            let key = ScopeKey::Collection(collection.id.clone());
            let mut variables = collection.variables.clone();
            variables.extend(storage.load_variables(&key).await?);
            store.load_scope(key, variables);
            store.set_current_collection(Some(collection.id.clone()));
        }

        Ok(Self { store })
    }

    pub fn environment(&self) -> Option<&str> {
        self.store.active_environment()
    }

    pub fn collection(&self) -> Option<&str> {
        self.store.current_collection()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::variables::{Variable, VariableScope};

    #[tokio::test]
    async fn test_load_hydrates_all_scopes() {
        let storage = MemoryStorage::new();
        let env = ScopeKey::Environment("dev".to_string());
        let col = ScopeKey::Collection("c1".to_string());
        storage
            .set_variable(&ScopeKey::Global, "g", &Variable::new("global"))
            .await
            .unwrap();
        storage.set_variable(&env, "host", &Variable::new("dev.test")).await.unwrap();
        storage.set_variable(&col, "page", &Variable::new("2")).await.unwrap();

        let mut collection = Collection::new("c1", "Users");
        collection.variables.insert("page".to_string(), Variable::new("1"));
        collection.variables.insert("size".to_string(), Variable::new("10"));

        let session = Session::load(&storage, Some("dev"), Some(&collection))
            .await
            .unwrap();

        assert_eq!(session.environment(), Some("dev"));
        assert_eq!(session.collection(), Some("c1"));
        assert_eq!(session.store.get("g"), Some("global".to_string()));
        assert_eq!(session.store.get("host"), Some("dev.test".to_string()));
        assert_eq!(
            session.store.get_scoped(VariableScope::Collection, "page"),
            Some("2".to_string())
        );
        assert_eq!(session.store.get("size"), Some("10".to_string()));
        assert!(session.store.pending_writes().is_empty());
    }

    #[tokio::test]
    async fn test_load_without_environment() {
        let storage = MemoryStorage::new();
        let session = Session::load(&storage, None, None).await.unwrap();
        assert_eq!(session.environment(), None);
        assert!(session.store.snapshot().is_empty());
    }
}
