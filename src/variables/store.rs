//! Scoped variable store.
//!
//! Holds the global, environment, collection and local scopes and resolves
//! unscoped references with a fixed precedence:
//!
//! 1. Local (in-process only, written by scripts through `pm.variables.set`)
//! 2. Environment (the active environment)
//! 3. Collection (the current collection)
//! 4. Global
//!
//! Writes apply to memory immediately and are queued for persistence; call
//! [`VariableStore::flush`] to hand the queued writes to a [`Storage`].

use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while reading or writing variables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VarError {
    /// Variable is not defined in any scope
    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    /// Environment scope written while no environment is active
    #[error("No active environment to write '{0}' into")]
    NoActiveEnvironment(String),

    /// Collection scope written while no collection is selected
    #[error("No current collection to write '{0}' into")]
    NoCurrentCollection(String),
}

/// Variable namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    Global,
    Environment,
    Collection,
    Local,
}

impl VariableScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableScope::Global => "global",
            VariableScope::Environment => "environment",
            VariableScope::Collection => "collection",
            VariableScope::Local => "local",
        }
    }
}

impl fmt::Display for VariableScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted scope, qualified by its owner where the scope has one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "lowercase")]
pub enum ScopeKey {
    Global,
    Environment(String),
    Collection(String),
}

impl ScopeKey {
    pub fn scope(&self) -> VariableScope {
        match self {
            ScopeKey::Global => VariableScope::Global,
            ScopeKey::Environment(_) => VariableScope::Environment,
            ScopeKey::Collection(_) => VariableScope::Collection,
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKey::Global => f.write_str("global"),
            ScopeKey::Environment(id) => write!(f, "environment:{}", id),
            ScopeKey::Collection(id) => write!(f, "collection:{}", id),
        }
    }
}

/// A single variable value with its description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Variable {
    pub value: String,
    #[serde(default)]
    pub description: String,
}

impl Variable {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            description: String::new(),
        }
    }
}

/// A write waiting to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    Set {
        key: ScopeKey,
        name: String,
        variable: Variable,
    },
    Unset {
        key: ScopeKey,
        name: String,
    },
}

impl PendingWrite {
    fn target(&self) -> (&ScopeKey, &str) {
        match self {
            PendingWrite::Set { key, name, .. } | PendingWrite::Unset { key, name } => {
                (key, name.as_str())
            }
        }
    }
}

type Scope = HashMap<String, Variable>;

/// In-memory variable scopes plus the queue of writes awaiting persistence.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    globals: Scope,
    environments: HashMap<String, Scope>,
    collections: HashMap<String, Scope>,
    locals: Scope,
    active_environment: Option<String>,
    current_collection: Option<String>,
    pending: Vec<PendingWrite>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the active environment. Only one environment is active at a time.
    pub fn set_active_environment(&mut self, id: Option<String>) {
        self.active_environment = id;
    }

    pub fn active_environment(&self) -> Option<&str> {
        self.active_environment.as_deref()
    }

    /// Selects the collection whose scope participates in resolution.
    pub fn set_current_collection(&mut self, id: Option<String>) {
        self.current_collection = id;
    }

    pub fn current_collection(&self) -> Option<&str> {
        self.current_collection.as_deref()
    }

    /// Resolves `name` using local > environment > collection > global.
    pub fn get(&self, name: &str) -> Option<String> {
        [
            VariableScope::Local,
            VariableScope::Environment,
            VariableScope::Collection,
            VariableScope::Global,
        ]
        .iter()
        .find_map(|scope| self.get_scoped(*scope, name))
    }

    /// Resolves `name` within a single scope.
    pub fn get_scoped(&self, scope: VariableScope, name: &str) -> Option<String> {
        self.variable(scope, name).map(|v| v.value.clone())
    }

    /// Returns the full variable (value and description) within a single scope.
    pub fn variable(&self, scope: VariableScope, name: &str) -> Option<&Variable> {
        self.scope(scope).and_then(|vars| vars.get(name))
    }

    /// Checks whether `name` resolves in any scope.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets a variable. The in-memory value is visible immediately; the
    /// persistence write is queued until [`flush`](Self::flush).
    pub fn set(
        &mut self,
        scope: VariableScope,
        name: impl Into<String>,
        value: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), VarError> {
        let name = name.into();
        let variable = Variable {
            value: value.into(),
            description: description.into(),
        };

        let key = self.scope_key(scope, &name)?;
        self.scope_mut(scope, &name)?
            .insert(name.clone(), variable.clone());

        if let Some(key) = key {
            self.queue(PendingWrite::Set {
                key,
                name,
                variable,
            });
        }
        Ok(())
    }

    /// Removes a variable from one scope. Sibling scopes are untouched.
    pub fn unset(&mut self, scope: VariableScope, name: &str) -> Result<(), VarError> {
        let key = self.scope_key(scope, name)?;
        self.scope_mut(scope, name)?.remove(name);

        if let Some(key) = key {
            self.queue(PendingWrite::Unset {
                key,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Queues `write`, replacing any earlier write to the same variable.
    fn queue(&mut self, write: PendingWrite) {
        let target = write.target();
        self.pending.retain(|queued| queued.target() != target);
        self.pending.push(write);
    }

    /// Replaces the contents of a persisted scope without queuing writes.
    ///
    /// Used to hydrate the store from storage.
    pub fn load_scope(&mut self, key: ScopeKey, variables: HashMap<String, Variable>) {
        match key {
            ScopeKey::Global => self.globals = variables,
            ScopeKey::Environment(id) => {
                self.environments.insert(id, variables);
            }
            ScopeKey::Collection(id) => {
                self.collections.insert(id, variables);
            }
        }
    }

    /// Every name visible to [`get`](Self::get), mapped to its resolved value.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let mut resolved = BTreeMap::new();
        for scope in [
            VariableScope::Global,
            VariableScope::Collection,
            VariableScope::Environment,
            VariableScope::Local,
        ] {
            if let Some(vars) = self.scope(scope) {
                for (name, var) in vars {
                    resolved.insert(name.clone(), var.value.clone());
                }
            }
        }
        resolved
    }

    /// Drops every local variable.
    pub fn clear_locals(&mut self) {
        self.locals.clear();
    }

    /// Writes waiting to be persisted, oldest first. Only the latest write
    /// to each variable is kept.
    pub fn pending_writes(&self) -> &[PendingWrite] {
        &self.pending
    }

    /// Persists all queued writes in order.
    ///
    /// Failures are logged and do not roll back the in-memory value. Returns
    /// the number of writes that were persisted successfully.
    pub async fn flush(&mut self, storage: &dyn Storage) -> usize {
        let mut persisted = 0;
        for write in std::mem::take(&mut self.pending) {
            let result = match &write {
                PendingWrite::Set {
                    key,
                    name,
                    variable,
                } => storage.set_variable(key, name, variable).await,
                PendingWrite::Unset { key, name } => storage.unset_variable(key, name).await,
            };

            match result {
                Ok(()) => persisted += 1,
                Err(e) => log::warn!("Failed to persist variable write {:?}: {}", write, e),
            }
        }
        persisted
    }

    fn scope(&self, scope: VariableScope) -> Option<&Scope> {
        match scope {
            VariableScope::Global => Some(&self.globals),
            VariableScope::Local => Some(&self.locals),
            VariableScope::Environment => self
                .active_environment
                .as_ref()
                .and_then(|id| self.environments.get(id)),
            VariableScope::Collection => self
                .current_collection
                .as_ref()
                .and_then(|id| self.collections.get(id)),
        }
    }

    fn scope_mut(&mut self, scope: VariableScope, name: &str) -> Result<&mut Scope, VarError> {
        match scope {
            VariableScope::Global => Ok(&mut self.globals),
            VariableScope::Local => Ok(&mut self.locals),
            VariableScope::Environment => {
                let id = self
                    .active_environment
                    .clone()
                    .ok_or_else(|| VarError::NoActiveEnvironment(name.to_string()))?;
                Ok(self.environments.entry(id).or_default())
            }
            VariableScope::Collection => {
                let id = self
                    .current_collection
                    .clone()
                    .ok_or_else(|| VarError::NoCurrentCollection(name.to_string()))?;
                Ok(self.collections.entry(id).or_default())
            }
        }
    }

    /// Storage key for a scope, or `None` for the in-process local scope.
    fn scope_key(&self, scope: VariableScope, name: &str) -> Result<Option<ScopeKey>, VarError> {
        match scope {
            VariableScope::Local => Ok(None),
            VariableScope::Global => Ok(Some(ScopeKey::Global)),
            VariableScope::Environment => self
                .active_environment
                .clone()
                .map(|id| Some(ScopeKey::Environment(id)))
                .ok_or_else(|| VarError::NoActiveEnvironment(name.to_string())),
            VariableScope::Collection => self
                .current_collection
                .clone()
                .map(|id| Some(ScopeKey::Collection(id)))
                .ok_or_else(|| VarError::NoCurrentCollection(name.to_string())),
        }
    }
}
