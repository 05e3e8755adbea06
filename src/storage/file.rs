//! Directory-backed storage.
//!
//! Layout of the data directory:
//!
//! - `variables.json`: `{ "<scope>": { "<name>": { "value", "description" } } }`
//!   where `<scope>` is `global`, `environment:<id>` or `collection:<id>`
//! - `collections.json`: array of collections
//! - `history.jsonl`: one history entry per line, oldest first
//!
//! Documents are replaced through a temporary file and a rename. Unreadable
//! history lines are skipped with a warning.

use super::{scope_path, Storage, StorageError};
use crate::history::HistoryEntry;
use crate::models::Collection;
use crate::variables::{ScopeKey, Variable};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub const VARIABLES_FILE: &str = "variables.json";
pub const COLLECTIONS_FILE: &str = "collections.json";
pub const HISTORY_FILE: &str = "history.jsonl";

type VariablesDocument = BTreeMap<String, BTreeMap<String, Variable>>;

/// [`Storage`] backed by JSON files in a directory.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    /// Serializes read-modify-write cycles on the files
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Uses `dir` as the data directory. It is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    async fn read_variables(&self) -> Result<VariablesDocument, StorageError> {
        Ok(read_json(&self.path(VARIABLES_FILE)).await?.unwrap_or_default())
    }

    async fn update_variables<F>(&self, update: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut VariablesDocument) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_variables().await?;
        update(&mut document);
        write_json(&self.path(VARIABLES_FILE), &document).await
    }

    async fn write_history(&self, entries: &[HistoryEntry]) -> Result<(), StorageError> {
        let mut contents = String::new();
        for entry in entries {
            contents.push_str(&serde_json::to_string(entry)?);
            contents.push('\n');
        }
        replace_file(&self.path(HISTORY_FILE), contents.as_bytes()).await
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get_variable(&self, key: &ScopeKey, name: &str) -> Result<Option<String>, StorageError> {
        let document = self.read_variables().await?;
        Ok(document
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
        let scope = scope_path(key);
        self.update_variables(|document| {
            document
                .entry(scope)
                .or_default()
                .insert(name.to_string(), variable.clone());
        })
        .await
    }

    async fn unset_variable(&self, key: &ScopeKey, name: &str) -> Result<(), StorageError> {
        let scope = scope_path(key);
        self.update_variables(|document| {
            if let Some(variables) = document.get_mut(&scope) {
                variables.remove(name);
                if variables.is_empty() {
                    document.remove(&scope);
                }
            }
        })
        .await
    }

    async fn load_variables(&self, key: &ScopeKey) -> Result<HashMap<String, Variable>, StorageError> {
        let mut document = self.read_variables().await?;
        Ok(document
            .remove(&scope_path(key))
            .map(|scope| scope.into_iter().collect())
            .unwrap_or_default())
    }

    async fn get_collections(&self) -> Result<Vec<Collection>, StorageError> {
        Ok(read_json(&self.path(COLLECTIONS_FILE)).await?.unwrap_or_default())
    }

    async fn save_collections(&self, collections: &[Collection]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.path(COLLECTIONS_FILE), &collections).await
    }

    async fn get_history(&self) -> Result<Vec<HistoryEntry>, StorageError> {
        let contents = match fs::read_to_string(self.path(HISTORY_FILE)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        let mut corrupted_lines = 0;
        for (line_num, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    corrupted_lines += 1;
                    log::warn!(
                        "Skipping corrupted history entry at line {}: {}",
                        line_num + 1,
                        e
                    );
                }
            }
        }

        if corrupted_lines > entries.len() {
            log::warn!(
                "History file has significant corruption ({} corrupted lines, {} valid entries)",
                corrupted_lines,
                entries.len()
            );
        }
        Ok(entries)
    }

    async fn append_history(&self, entry: HistoryEntry, limit: usize) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.dir).await?;

        let line = format!("{}\n", serde_json::to_string(&entry)?);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(HISTORY_FILE))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        drop(file);

        let entries = self.get_history().await?;
        if entries.len() > limit {
            let excess = entries.len() - limit;
            log::debug!("Dropping {} old history entries", excess);
            self.write_history(&entries[excess..]).await?;
        }
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    replace_file(path, &bytes).await
}

/// Writes to a temporary sibling, then renames it over `path`.
async fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, bytes).await?;
    fs::rename(&temp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HeaderMap, HttpMethod, ProcessedRequest, ProcessedResponse, TestResult};
    use serde_json::Value;
    use tempfile::TempDir;

    fn entry(n: usize) -> HistoryEntry {
        HistoryEntry::new(
            ProcessedRequest {
                method: HttpMethod::POST,
                url: format!("https://api.test/{}", n),
                headers: HashMap::new(),
                body: Some("{}".to_string()),
            },
            ProcessedResponse {
                status: 201,
                status_text: "Created".to_string(),
                headers: HeaderMap::new(),
                body_text: "created".to_string(),
                body: Value::String("created".to_string()),
                duration: 3,
                size: 7,
            },
            vec![TestResult::pass("status 201")],
        )
    }

    #[tokio::test]
    async fn test_missing_files_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("data"));

        assert!(storage.get_history().await.unwrap().is_empty());
        assert!(storage.get_collections().await.unwrap().is_empty());
        assert!(storage
            .load_variables(&ScopeKey::Global)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_variables_persist_across_instances() {
        let dir = TempDir::new().unwrap();
        let dev = ScopeKey::Environment("dev".to_string());

        let storage = FileStorage::new(dir.path());
        storage
            .set_variable(&dev, "token", &Variable::new("abc"))
            .await
            .unwrap();
        storage
            .set_variable(&ScopeKey::Global, "host", &Variable::new("api.test"))
            .await
            .unwrap();

        let reopened = FileStorage::new(dir.path());
        assert_eq!(
            reopened.get_variable(&dev, "token").await.unwrap(),
            Some("abc".to_string())
        );
        assert_eq!(reopened.load_variables(&ScopeKey::Global).await.unwrap().len(), 1);

        reopened.unset_variable(&dev, "token").await.unwrap();
        assert_eq!(reopened.get_variable(&dev, "token").await.unwrap(), None);

        let raw = std::fs::read_to_string(dir.path().join(VARIABLES_FILE)).unwrap();
        assert!(!raw.contains("environment:dev"));
    }

    #[tokio::test]
    async fn test_history_append_and_limit() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());

        for n in 0..4 {
            storage.append_history(entry(n), 2).await.unwrap();
        }

        let history = storage.get_history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].request.url, "https://api.test/2");
        assert_eq!(history[1].request.url, "https://api.test/3");
        assert_eq!(history[1].test_results, vec![TestResult::pass("status 201")]);
    }

    #[tokio::test]
    async fn test_corrupted_history_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.append_history(entry(0), 10).await.unwrap();

        let path = dir.path().join(HISTORY_FILE);
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("{not json\n");
        std::fs::write(&path, contents).unwrap();

        storage.append_history(entry(1), 10).await.unwrap();
        assert_eq!(storage.get_history().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_collections_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let mut collection = Collection::new("c1", "Users API");
        collection
            .variables
            .insert("base".to_string(), Variable::new("https://api.test"));

        storage.save_collections(&[collection.clone()]).await.unwrap();
        assert_eq!(storage.get_collections().await.unwrap(), vec![collection]);
    }
}
