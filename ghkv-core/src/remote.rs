//! Remote content store abstraction
//!
//! The minimal set of content primitives the path entries and the record
//! store are built on. Every mutation is one commit on the target branch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::path::RepoPath;

/// Type of an entry in a repository tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Submodule,
}

/// One blob or directory as reported by the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    /// Full path from the repository root
    pub path: RepoPath,
    /// Final path segment
    pub name: String,
    /// Content-address token (blob or tree SHA)
    pub sha: String,
    pub kind: EntryKind,
    pub size: u64,
    /// Decoded content; only present when a single file was fetched
    pub content: Option<Vec<u8>>,
}

impl ContentEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Result of fetching a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contents {
    File(ContentEntry),
    Dir(Vec<ContentEntry>),
}

impl Contents {
    /// Expect a single file
    pub fn into_file(self, path: &RepoPath) -> Result<ContentEntry> {
        match self {
            Contents::File(entry) => Ok(entry),
            Contents::Dir(_) => Err(StoreError::InvalidArgument(format!(
                "'{}' is a directory, not a file",
                path
            ))),
        }
    }

    /// Expect a directory listing
    pub fn into_dir(self, path: &RepoPath) -> Result<Vec<ContentEntry>> {
        match self {
            Contents::Dir(entries) => Ok(entries),
            Contents::File(_) => Err(StoreError::InvalidArgument(format!(
                "'{}' is a file, not a directory",
                path
            ))),
        }
    }
}

/// What a successful mutation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    /// SHA of the new blob (`None` after a delete)
    pub content_sha: Option<String>,
    /// SHA of the commit that carried the change (`None` when the write was
    /// confirmed by reading the path back)
    pub commit_sha: Option<String>,
}

/// Content primitives on a single repository.
///
/// Implementations report a missing path as [`StoreError::NotFound`], and a
/// create over an existing path or a write with a stale `sha` as
/// [`StoreError::Conflict`].
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch a file (with content) or a one-level directory listing
    async fn get(&self, path: &RepoPath, branch: &str) -> Result<Contents>;

    /// Create a new blob; fails if one already exists at `path`
    async fn create_file(
        &self,
        path: &RepoPath,
        content: &[u8],
        message: &str,
        branch: &str,
    ) -> Result<WriteReceipt>;

    /// Overwrite the blob whose current SHA is `sha`
    async fn update_file(
        &self,
        path: &RepoPath,
        content: &[u8],
        sha: &str,
        message: &str,
        branch: &str,
    ) -> Result<WriteReceipt>;

    /// Remove the blob whose current SHA is `sha`
    async fn delete_file(
        &self,
        path: &RepoPath,
        sha: &str,
        message: &str,
        branch: &str,
    ) -> Result<WriteReceipt>;
}

#[async_trait]
impl<S: ContentStore + ?Sized> ContentStore for Arc<S> {
    async fn get(&self, path: &RepoPath, branch: &str) -> Result<Contents> {
        self.as_ref().get(path, branch).await
    }

    async fn create_file(
        &self,
        path: &RepoPath,
        content: &[u8],
        message: &str,
        branch: &str,
    ) -> Result<WriteReceipt> {
        self.as_ref().create_file(path, content, message, branch).await
    }

    async fn update_file(
        &self,
        path: &RepoPath,
        content: &[u8],
        sha: &str,
        message: &str,
        branch: &str,
    ) -> Result<WriteReceipt> {
        self.as_ref()
            .update_file(path, content, sha, message, branch)
            .await
    }

    async fn delete_file(
        &self,
        path: &RepoPath,
        sha: &str,
        message: &str,
        branch: &str,
    ) -> Result<WriteReceipt> {
        self.as_ref().delete_file(path, sha, message, branch).await
    }
}
