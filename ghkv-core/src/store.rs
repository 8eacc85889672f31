//! Record store facade
//!
//! Maps a class/table/record model onto repository contents:
//!
//! ```text
//! {class}/            one directory per class (kept alive by .gitkeep)
//! {class}/{table}.json    one JSON object per table
//! ```
//!
//! Every record operation is a read-modify-write of the whole table
//! document. The rewrite carries the SHA that was read, so a concurrent
//! writer surfaces as a `Conflict` instead of being silently overwritten.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::GhkvConfig;
use crate::error::{Result, StoreError};
use crate::file::FileEntry;
use crate::folder::{FolderEntry, TreeReport};
use crate::github::GitHubClient;
use crate::memory::{DEFAULT_BRANCH, MemoryRepository};
use crate::path::{FOLDER_MARKER, RepoPath};
use crate::remote::ContentStore;

/// Extension of table documents
const TABLE_EXTENSION: &str = ".json";

/// A table document: record name to value, in insertion order
pub type Table = Map<String, Value>;

/// Outcome of an idempotent create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provision {
    Created,
    AlreadyExists,
}

/// Class/table/record operations on one branch of a content store
#[derive(Clone)]
pub struct RecordStore {
    store: Arc<dyn ContentStore>,
    branch: String,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    pub fn new(store: Arc<dyn ContentStore>, branch: impl Into<String>) -> Self {
        Self {
            store,
            branch: branch.into(),
        }
    }

    /// A store backed by a fresh [`MemoryRepository`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRepository::new()), DEFAULT_BRANCH)
    }

    /// Validate `config` and connect to the GitHub repository it names
    pub async fn connect(config: &GhkvConfig) -> Result<Self> {
        config.validate()?;
        let repo = GitHubClient::connect(&config.github, config.retry.clone()).await?;
        Ok(Self::new(Arc::new(repo), config.github.branch.clone()))
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// The underlying content store
    pub fn backend(&self) -> &dyn ContentStore {
        self.store.as_ref()
    }

    pub fn file(&self, path: RepoPath) -> FileEntry<'_> {
        FileEntry::new(self.store.as_ref(), path, &self.branch)
    }

    pub fn folder(&self, path: RepoPath) -> FolderEntry<'_> {
        FolderEntry::new(self.store.as_ref(), path, &self.branch)
    }

    /// Create the class folder unless it already exists
    pub async fn create_class(&self, name: &str) -> Result<Provision> {
        let folder = self.folder(class_path(name)?);
        if folder.exists().await? {
            tracing::info!("Class '{}' already exists", name);
            return Ok(Provision::AlreadyExists);
        }
        folder.create().await?;
        tracing::info!("Class '{}' created", name);
        Ok(Provision::Created)
    }

    /// Create an empty table document unless one already exists.
    ///
    /// An existing document is left untouched, whatever it contains.
    pub async fn create_table(&self, name: &str, class: &str) -> Result<Provision> {
        let path = table_path(class, name)?;
        match self.store.get(&path, &self.branch).await {
            Ok(contents) => {
                contents.into_file(&path)?;
                tracing::info!("Table '{}' already exists in class '{}'", name, class);
                Ok(Provision::AlreadyExists)
            }
            Err(e) if e.is_not_found() => {
                self.file(path)
                    .with_message(format!("Create table '{}' in class '{}'", name, class))
                    .create(&encode_table(&Table::new())?)
                    .await?;
                tracing::info!("Table '{}' created in class '{}'", name, class);
                Ok(Provision::Created)
            }
            Err(e) => Err(e),
        }
    }

    /// Add a record; fails if `name` is already present
    pub async fn insert_data(&self, table: &str, class: &str, name: &str, data: Value) -> Result<()> {
        let doc = self.load(class, table).await?;
        let mut records = doc.records;
        if records.contains_key(name) {
            return Err(StoreError::RecordExists {
                table: table_label(class, table),
                name: name.to_string(),
            });
        }
        records.insert(name.to_string(), data);
        self.save(&doc.path, &doc.sha, &records, format!("Insert record '{}' into {}", name, doc.path))
            .await?;
        tracing::info!("Record '{}' inserted into '{}'", name, table_label(class, table));
        Ok(())
    }

    /// Remove a record; fails if `name` is absent
    pub async fn remove_data(&self, table: &str, class: &str, name: &str) -> Result<Value> {
        let doc = self.load(class, table).await?;
        let mut records = doc.records;
        let removed = records.shift_remove(name).ok_or_else(|| StoreError::RecordNotFound {
            table: table_label(class, table),
            name: name.to_string(),
        })?;
        self.save(&doc.path, &doc.sha, &records, format!("Remove record '{}' from {}", name, doc.path))
            .await?;
        tracing::info!("Record '{}' removed from '{}'", name, table_label(class, table));
        Ok(removed)
    }

    /// Replace the value of an existing record
    pub async fn update_data(&self, table: &str, class: &str, name: &str, data: Value) -> Result<()> {
        let doc = self.load(class, table).await?;
        let mut records = doc.records;
        match records.get_mut(name) {
            Some(slot) => *slot = data,
            None => {
                return Err(StoreError::RecordNotFound {
                    table: table_label(class, table),
                    name: name.to_string(),
                });
            }
        }
        self.save(&doc.path, &doc.sha, &records, format!("Update record '{}' in {}", name, doc.path))
            .await?;
        tracing::info!("Record '{}' updated in '{}'", name, table_label(class, table));
        Ok(())
    }

    /// Every record of a table
    pub async fn get_data(&self, table: &str, class: &str) -> Result<Table> {
        Ok(self.load(class, table).await?.records)
    }

    /// One record, `None` when absent
    pub async fn search_data(&self, table: &str, class: &str, name: &str) -> Result<Option<Value>> {
        let records = self.load(class, table).await?.records;
        Ok(records.get(name).cloned())
    }

    /// Delete a table document
    pub async fn remove_table(&self, class: &str, table: &str) -> Result<()> {
        self.file(table_path(class, table)?)
            .with_message(format!("Remove table '{}' from class '{}'", table, class))
            .delete()
            .await?;
        tracing::info!("Table '{}' removed from class '{}'", table, class);
        Ok(())
    }

    /// Delete a class with every table in it
    pub async fn remove_class(&self, class: &str) -> Result<TreeReport> {
        let report = self.folder(class_path(class)?).delete().await?;
        tracing::info!("Class '{}' removed", class);
        Ok(report)
    }

    /// Names of all classes, in listing order
    pub async fn list_classes(&self) -> Result<Vec<String>> {
        let root = RepoPath::root();
        let entries = match self.store.get(&root, &self.branch).await {
            Ok(contents) => contents.into_dir(&root)?,
            // GitHub answers 404 for the root of an empty repository
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(entries
            .into_iter()
            .filter(|entry| entry.is_dir())
            .map(|entry| entry.name)
            .collect())
    }

    /// Names of the tables in `class`, without extension
    pub async fn list_tables(&self, class: &str) -> Result<Vec<String>> {
        let entries = self.folder(class_path(class)?).list().await?;
        Ok(entries
            .into_iter()
            .filter(|entry| !entry.is_dir())
            .filter_map(|entry| {
                entry
                    .name
                    .strip_suffix(TABLE_EXTENSION)
                    .filter(|stem| !stem.is_empty())
                    .map(str::to_string)
            })
            .collect())
    }

    /// Rename a class, moving every table in it
    pub async fn rename_class(&self, class: &str, new_name: &str) -> Result<TreeReport> {
        class_path(new_name)?;
        let report = self.folder(class_path(class)?).rename(new_name).await?;
        tracing::info!("Class '{}' renamed to '{}'", class, new_name);
        Ok(report)
    }

    async fn load(&self, class: &str, table: &str) -> Result<TableDocument> {
        let path = table_path(class, table)?;
        let entry = self
            .store
            .get(&path, &self.branch)
            .await?
            .into_file(&path)?;
        let content = entry.content.as_deref().ok_or_else(|| {
            StoreError::Decode(format!("no content returned for '{}'", path))
        })?;
        let records = decode_table(&path, content)?;
        Ok(TableDocument {
            path,
            sha: entry.sha,
            records,
        })
    }

    async fn save(&self, path: &RepoPath, sha: &str, records: &Table, message: String) -> Result<()> {
        let content = encode_table(records)?;
        self.store
            .update_file(path, &content, sha, &message, &self.branch)
            .await?;
        Ok(())
    }
}

/// A table as read, with the SHA it must be written back against
struct TableDocument {
    path: RepoPath,
    sha: String,
    records: Table,
}

fn single_segment(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StoreError::InvalidArgument(format!("{} name cannot be empty", kind)));
    }
    if name.contains('/') || name == "." || name == ".." {
        return Err(StoreError::InvalidArgument(format!(
            "{} name '{}' must be a single path segment",
            kind, name
        )));
    }
    Ok(())
}

fn class_path(class: &str) -> Result<RepoPath> {
    single_segment("class", class)?;
    if class == FOLDER_MARKER {
        return Err(StoreError::InvalidArgument(format!(
            "'{}' is reserved",
            FOLDER_MARKER
        )));
    }
    RepoPath::new(class)
}

fn table_path(class: &str, table: &str) -> Result<RepoPath> {
    single_segment("table", table)?;
    class_path(class)?.join(&format!("{}{}", table, TABLE_EXTENSION))
}

fn table_label(class: &str, table: &str) -> String {
    format!("{}/{}", class, table)
}

/// Pretty-printed JSON with a trailing newline
fn encode_table(records: &Table) -> Result<Vec<u8>> {
    let mut out = serde_json::to_vec_pretty(records)?;
    out.push(b'\n');
    Ok(out)
}

fn decode_table(path: &RepoPath, content: &[u8]) -> Result<Table> {
    let value: Value = serde_json::from_slice(content).map_err(|e| StoreError::Malformed {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    match value {
        Value::Object(records) => Ok(records),
        other => Err(StoreError::Malformed {
            path: path.to_string(),
            reason: format!("expected a JSON object, found {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store_with_table() -> (RecordStore, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        let store = RecordStore::new(repo.clone(), DEFAULT_BRANCH);
        store.create_class("C").await.unwrap();
        store.create_table("T", "C").await.unwrap();
        (store, repo)
    }

    #[tokio::test]
    async fn test_create_class_is_idempotent() {
        let store = RecordStore::in_memory();
        assert_eq!(store.create_class("C").await.unwrap(), Provision::Created);
        assert_eq!(store.create_class("C").await.unwrap(), Provision::AlreadyExists);
    }

    #[tokio::test]
    async fn test_create_table_writes_empty_object() {
        let (_store, repo) = store_with_table().await;
        assert_eq!(repo.blob("C/T.json", "main").await.unwrap(), b"{}\n");
    }

    #[tokio::test]
    async fn test_create_table_never_overwrites() {
        let (store, repo) = store_with_table().await;
        store.insert_data("T", "C", "k", json!(1)).await.unwrap();
        let before = repo.commit_count().await;

        assert_eq!(
            store.create_table("T", "C").await.unwrap(),
            Provision::AlreadyExists
        );
        assert_eq!(repo.commit_count().await, before);
        assert_eq!(store.get_data("T", "C").await.unwrap()["k"], json!(1));
    }

    #[tokio::test]
    async fn test_insert_and_search() {
        let (store, _repo) = store_with_table().await;
        store
            .insert_data("T", "C", "user", json!({"name": "ada", "age": 36}))
            .await
            .unwrap();

        let found = store.search_data("T", "C", "user").await.unwrap();
        assert_eq!(found, Some(json!({"name": "ada", "age": 36})));
        assert_eq!(store.search_data("T", "C", "other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_insert_leaves_document() {
        let (store, repo) = store_with_table().await;
        store.insert_data("T", "C", "k", json!("v1")).await.unwrap();
        let before = repo.commit_count().await;

        let err = store.insert_data("T", "C", "k", json!("v2")).await.unwrap_err();
        assert!(matches!(err, StoreError::RecordExists { .. }));
        assert_eq!(repo.commit_count().await, before);
        assert_eq!(store.search_data("T", "C", "k").await.unwrap(), Some(json!("v1")));
    }

    #[tokio::test]
    async fn test_update_and_remove_missing() {
        let (store, repo) = store_with_table().await;
        let before = repo.commit_count().await;

        let err = store.update_data("T", "C", "k", json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));
        let err = store.remove_data("T", "C", "k").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(repo.commit_count().await, before);
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let (store, _repo) = store_with_table().await;
        store.insert_data("T", "C", "a", json!(1)).await.unwrap();
        store.insert_data("T", "C", "b", json!(2)).await.unwrap();
        store.update_data("T", "C", "a", json!(10)).await.unwrap();

        assert_eq!(store.remove_data("T", "C", "b").await.unwrap(), json!(2));
        let data = store.get_data("T", "C").await.unwrap();
        assert_eq!(Value::Object(data), json!({"a": 10}));
    }

    #[tokio::test]
    async fn test_insertion_order_and_format() {
        let (store, repo) = store_with_table().await;
        store.insert_data("T", "C", "zeta", json!(1)).await.unwrap();
        store.insert_data("T", "C", "alpha", json!(2)).await.unwrap();

        let keys: Vec<String> = store.get_data("T", "C").await.unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);

        let raw = String::from_utf8(repo.blob("C/T.json", "main").await.unwrap()).unwrap();
        assert_eq!(raw, "{\n  \"zeta\": 1,\n  \"alpha\": 2\n}\n");
    }

    #[tokio::test]
    async fn test_non_object_document_is_malformed() {
        let repo = Arc::new(MemoryRepository::new());
        let store = RecordStore::new(repo.clone(), DEFAULT_BRANCH);
        for (table, content) in [("list", "[1, 2]"), ("junk", "not json")] {
            store
                .file(RepoPath::new(&format!("C/{}.json", table)).unwrap())
                .create(content.as_bytes())
                .await
                .unwrap();
            let err = store.get_data(table, "C").await.unwrap_err();
            assert!(matches!(err, StoreError::Malformed { .. }), "{table}: {err}");
        }
    }

    #[tokio::test]
    async fn test_missing_table() {
        let store = RecordStore::in_memory();
        assert!(store.get_data("T", "C").await.unwrap_err().is_not_found());
        assert!(store.remove_table("C", "T").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_listing() {
        let (store, _repo) = store_with_table().await;
        store.create_table("U", "C").await.unwrap();
        store.create_class("D").await.unwrap();

        assert_eq!(store.list_classes().await.unwrap(), vec!["C", "D"]);
        assert_eq!(store.list_tables("C").await.unwrap(), vec!["T", "U"]);
        assert!(store.list_tables("D").await.unwrap().is_empty());
        assert!(store.list_tables("missing").await.unwrap_err().is_not_found());
        assert!(RecordStore::in_memory().list_classes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_and_remove_class() {
        let (store, repo) = store_with_table().await;
        store.insert_data("T", "C", "k", json!(true)).await.unwrap();

        store.rename_class("C", "D").await.unwrap();
        assert_eq!(store.search_data("T", "D", "k").await.unwrap(), Some(json!(true)));
        assert!(store.get_data("T", "C").await.unwrap_err().is_not_found());

        let report = store.remove_class("D").await.unwrap();
        assert_eq!(report.files.len(), 2);
        assert!(repo.paths("main").await.is_empty());
    }

    #[tokio::test]
    async fn test_names_are_validated() {
        let store = RecordStore::in_memory();
        assert!(store.create_class("").await.is_err());
        assert!(store.create_class("a/b").await.is_err());
        assert!(store.create_class(".gitkeep").await.is_err());
        assert!(store.create_table("x/y", "C").await.is_err());
        assert!(store.rename_class("C", "..").await.is_err());
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let (store, repo) = store_with_table().await;
        let path = RepoPath::new("C/T.json").unwrap();
        let entry = repo.get(&path, "main").await.unwrap().into_file(&path).unwrap();

        store.insert_data("T", "C", "k", json!(1)).await.unwrap();
        let err = store.save(&path, &entry.sha, &Table::new(), "stale".to_string()).await.unwrap_err();
        assert!(err.is_conflict());
    }
}
