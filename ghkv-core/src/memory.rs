//! In-memory content store
//!
//! Behaves like a GitHub repository as far as [`ContentStore`] is concerned:
//! git blob SHAs, one commit per mutation, implicit directories. Used by the
//! test suites and by `ghkv --memory`.

use async_trait::async_trait;
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::path::RepoPath;
use crate::remote::{ContentEntry, ContentStore, Contents, EntryKind, WriteReceipt};

/// Default branch of a fresh repository
pub const DEFAULT_BRANCH: &str = "main";

/// Compute the git blob SHA-1 of `data`
pub fn git_blob_sha(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", data.len()).as_bytes());
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// A commit recorded by [`MemoryRepository`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub sha: String,
    pub message: String,
    pub branch: String,
    pub timestamp: i64,
}

type Tree = BTreeMap<String, Vec<u8>>;

/// In-memory repository
#[derive(Clone)]
pub struct MemoryRepository {
    /// Branch name -> (path -> blob)
    branches: Arc<RwLock<HashMap<String, Tree>>>,

    /// Commit history, oldest first
    commits: Arc<RwLock<Vec<CommitRecord>>>,

    /// Paths whose mutations fail
    failing: Arc<RwLock<BTreeSet<String>>>,
}

impl MemoryRepository {
    /// Create an empty repository with a `main` branch
    pub fn new() -> Self {
        let mut branches = HashMap::new();
        branches.insert(DEFAULT_BRANCH.to_string(), Tree::new());
        Self {
            branches: Arc::new(RwLock::new(branches)),
            commits: Arc::new(RwLock::new(Vec::new())),
            failing: Arc::new(RwLock::new(BTreeSet::new())),
        }
    }

    /// Add an empty branch
    pub async fn with_branch(self, branch: &str) -> Self {
        self.branches
            .write()
            .await
            .entry(branch.to_string())
            .or_default();
        self
    }

    /// Make every mutation of `path` fail with a transient remote error
    pub async fn fail_writes_to(&self, path: &str) -> Result<()> {
        let path = RepoPath::new(path)?;
        self.failing.write().await.insert(path.to_string());
        Ok(())
    }

    /// Stop failing mutations of `path`
    pub async fn heal(&self, path: &str) -> Result<()> {
        let path = RepoPath::new(path)?;
        self.failing.write().await.remove(path.as_str());
        Ok(())
    }

    /// Commit log, oldest first
    pub async fn commits(&self) -> Vec<CommitRecord> {
        self.commits.read().await.clone()
    }

    /// Number of commits so far
    pub async fn commit_count(&self) -> usize {
        self.commits.read().await.len()
    }

    /// All blob paths on `branch`, sorted
    pub async fn paths(&self, branch: &str) -> Vec<String> {
        self.branches
            .read()
            .await
            .get(branch)
            .map(|tree| tree.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Raw blob content, bypassing the [`ContentStore`] API
    pub async fn blob(&self, path: &str, branch: &str) -> Option<Vec<u8>> {
        let path = RepoPath::new(path).ok()?;
        self.branches
            .read()
            .await
            .get(branch)
            .and_then(|tree| tree.get(path.as_str()).cloned())
    }

    async fn check_writable(&self, path: &RepoPath) -> Result<()> {
        if self.failing.read().await.contains(path.as_str()) {
            return Err(StoreError::Remote {
                status: 503,
                message: format!("injected failure writing '{}'", path),
            });
        }
        if path.is_root() {
            return Err(StoreError::InvalidPath(
                "cannot write to the repository root".to_string(),
            ));
        }
        Ok(())
    }

    async fn record_commit(&self, message: &str, branch: &str, path: &RepoPath) -> String {
        let mut commits = self.commits.write().await;
        let timestamp = chrono::Utc::now().timestamp();
        let seed = format!("{}\0{}\0{}\0{}", commits.len(), branch, path, message);
        let sha = hex::encode(Sha1::digest(seed.as_bytes()));
        commits.push(CommitRecord {
            sha: sha.clone(),
            message: message.to_string(),
            branch: branch.to_string(),
            timestamp,
        });
        sha
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRepository").finish_non_exhaustive()
    }
}

fn branch_not_found(branch: &str) -> StoreError {
    StoreError::NotFound(format!("branch '{}'", branch))
}

/// List the immediate children of `dir`, synthesizing directory entries
fn list_dir(tree: &Tree, dir: &RepoPath) -> Result<Vec<ContentEntry>> {
    let mut files = Vec::new();
    let mut dirs: BTreeMap<String, Vec<(&String, &Vec<u8>)>> = BTreeMap::new();

    for (key, data) in tree {
        let key_path = RepoPath::new(key)?;
        let rel = match key_path.relative_to(dir) {
            Some(rel) if !rel.is_root() => rel,
            _ => continue,
        };
        let mut segments = rel.segments();
        let first = segments.next().unwrap_or_default().to_string();
        if segments.next().is_some() {
            dirs.entry(first).or_default().push((key, data));
        } else {
            files.push(ContentEntry {
                path: key_path.clone(),
                name: first,
                sha: git_blob_sha(data),
                kind: EntryKind::File,
                size: data.len() as u64,
                content: None,
            });
        }
    }

    if files.is_empty() && dirs.is_empty() {
        return Err(StoreError::NotFound(dir.to_string()));
    }

    let mut entries = files;
    for (name, members) in dirs {
        // Tree SHA over member paths and blob SHAs
        let mut hasher = Sha1::new();
        for (key, data) in &members {
            hasher.update(key.as_bytes());
            hasher.update(git_blob_sha(data).as_bytes());
        }
        entries.push(ContentEntry {
            path: dir.join(&name)?,
            name,
            sha: hex::encode(hasher.finalize()),
            kind: EntryKind::Dir,
            size: 0,
            content: None,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[async_trait]
impl ContentStore for MemoryRepository {
    async fn get(&self, path: &RepoPath, branch: &str) -> Result<Contents> {
        let branches = self.branches.read().await;
        let tree = branches.get(branch).ok_or_else(|| branch_not_found(branch))?;

        if let Some(data) = tree.get(path.as_str()) {
            return Ok(Contents::File(ContentEntry {
                path: path.clone(),
                name: path.file_name().unwrap_or_default().to_string(),
                sha: git_blob_sha(data),
                kind: EntryKind::File,
                size: data.len() as u64,
                content: Some(data.clone()),
            }));
        }

        if path.is_root() && tree.is_empty() {
            return Ok(Contents::Dir(Vec::new()));
        }
        list_dir(tree, path).map(Contents::Dir)
    }

    async fn create_file(
        &self,
        path: &RepoPath,
        content: &[u8],
        message: &str,
        branch: &str,
    ) -> Result<WriteReceipt> {
        self.check_writable(path).await?;
        {
            let mut branches = self.branches.write().await;
            let tree = branches
                .get_mut(branch)
                .ok_or_else(|| branch_not_found(branch))?;
            if tree.contains_key(path.as_str()) {
                return Err(StoreError::Conflict(format!("'{}' already exists", path)));
            }
            // A blob cannot sit where a directory already is, or under a blob
            let dir_prefix = format!("{}/", path);
            if tree.keys().any(|k| k.starts_with(&dir_prefix)) {
                return Err(StoreError::Conflict(format!("'{}' is a directory", path)));
            }
            let mut ancestor = path.parent();
            while let Some(dir) = ancestor {
                if tree.contains_key(dir.as_str()) {
                    return Err(StoreError::Conflict(format!("'{}' is a file", dir)));
                }
                ancestor = dir.parent();
            }
            tree.insert(path.to_string(), content.to_vec());
        }
        let commit_sha = self.record_commit(message, branch, path).await;
        Ok(WriteReceipt {
            content_sha: Some(git_blob_sha(content)),
            commit_sha: Some(commit_sha),
        })
    }

    async fn update_file(
        &self,
        path: &RepoPath,
        content: &[u8],
        sha: &str,
        message: &str,
        branch: &str,
    ) -> Result<WriteReceipt> {
        self.check_writable(path).await?;
        {
            let mut branches = self.branches.write().await;
            let tree = branches
                .get_mut(branch)
                .ok_or_else(|| branch_not_found(branch))?;
            let current = tree
                .get_mut(path.as_str())
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            if git_blob_sha(current) != sha {
                return Err(StoreError::Conflict(format!(
                    "'{}' does not match {}",
                    path, sha
                )));
            }
            *current = content.to_vec();
        }
        let commit_sha = self.record_commit(message, branch, path).await;
        Ok(WriteReceipt {
            content_sha: Some(git_blob_sha(content)),
            commit_sha: Some(commit_sha),
        })
    }

    async fn delete_file(
        &self,
        path: &RepoPath,
        sha: &str,
        message: &str,
        branch: &str,
    ) -> Result<WriteReceipt> {
        self.check_writable(path).await?;
        {
            let mut branches = self.branches.write().await;
            let tree = branches
                .get_mut(branch)
                .ok_or_else(|| branch_not_found(branch))?;
            let current = tree
                .get(path.as_str())
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            if git_blob_sha(current) != sha {
                return Err(StoreError::Conflict(format!(
                    "'{}' does not match {}",
                    path, sha
                )));
            }
            tree.remove(path.as_str());
        }
        let commit_sha = self.record_commit(message, branch, path).await;
        Ok(WriteReceipt {
            content_sha: None,
            commit_sha: Some(commit_sha),
        })
    }
}
