//! Single blobs in the remote repository

use crate::error::{Result, StoreError};
use crate::folder::{check_tree_move, relocate_blob, relocate_tree, TreeReport};
use crate::path::RepoPath;
use crate::remote::{ContentStore, Contents, WriteReceipt};

/// A file addressed by path on one branch.
///
/// Every mutating call is one commit, except [`FileEntry::move_to`] which
/// takes two per relocated blob.
pub struct FileEntry<'r> {
    store: &'r dyn ContentStore,
    path: RepoPath,
    branch: &'r str,
    message: Option<String>,
}

impl<'r> FileEntry<'r> {
    pub fn new(store: &'r dyn ContentStore, path: RepoPath, branch: &'r str) -> Self {
        Self {
            store,
            path,
            branch,
            message: None,
        }
    }

    /// Use `message` for the next commits instead of the generated one
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn path(&self) -> &RepoPath {
        &self.path
    }

    fn message_or(&self, default: impl FnOnce() -> String) -> String {
        self.message.clone().unwrap_or_else(default)
    }

    /// Raw content
    pub async fn read_bytes(&self) -> Result<Vec<u8>> {
        let entry = self
            .store
            .get(&self.path, self.branch)
            .await?
            .into_file(&self.path)?;
        entry.content.ok_or_else(|| {
            StoreError::Decode(format!("no content returned for '{}'", self.path))
        })
    }

    /// Content decoded as UTF-8
    pub async fn read(&self) -> Result<String> {
        Ok(String::from_utf8(self.read_bytes().await?)?)
    }

    /// Whether a blob exists at this path
    pub async fn exists(&self) -> Result<bool> {
        match self.store.get(&self.path, self.branch).await {
            Ok(Contents::File(_)) => Ok(true),
            Ok(Contents::Dir(_)) => Ok(false),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create the blob; fails with a conflict if something is already there
    pub async fn create(&self, content: &[u8]) -> Result<WriteReceipt> {
        let message = self.message_or(|| format!("Create '{}'", self.path));
        let receipt = self
            .store
            .create_file(&self.path, content, &message, self.branch)
            .await?;
        tracing::info!("Created file '{}'", self.path);
        Ok(receipt)
    }

    /// Replace the content of an existing blob
    pub async fn update(&self, content: &[u8]) -> Result<WriteReceipt> {
        let current = self
            .store
            .get(&self.path, self.branch)
            .await?
            .into_file(&self.path)?;
        let message = self.message_or(|| format!("Update '{}'", self.path));
        let receipt = self
            .store
            .update_file(&self.path, content, &current.sha, &message, self.branch)
            .await?;
        tracing::info!("Updated file '{}'", self.path);
        Ok(receipt)
    }

    /// Remove the blob
    pub async fn delete(&self) -> Result<WriteReceipt> {
        let current = self
            .store
            .get(&self.path, self.branch)
            .await?
            .into_file(&self.path)?;
        let message = self.message_or(|| format!("Delete '{}'", self.path));
        let receipt = self
            .store
            .delete_file(&self.path, &current.sha, &message, self.branch)
            .await?;
        tracing::info!("Deleted file '{}'", self.path);
        Ok(receipt)
    }

    /// Move this blob to `dest`.
    ///
    /// When the path turns out to be a directory the whole subtree is
    /// relocated instead, as [`crate::FolderEntry::move_to`] would.
    pub async fn move_to(&self, dest: &RepoPath) -> Result<TreeReport> {
        if dest == &self.path {
            return Err(StoreError::InvalidArgument(format!(
                "'{}' is already at that path",
                self.path
            )));
        }

        let mut report = TreeReport::default();
        let operation = || format!("move '{}' to '{}'", self.path, dest);
        match self.store.get(&self.path, self.branch).await? {
            Contents::File(blob) => {
                relocate_blob(self.store, self.branch, blob, dest, &mut report)
                    .await
                    .map_err(|e| e.after_steps(operation(), report.commits))?;
            }
            Contents::Dir(_) => {
                check_tree_move(&self.path, dest)?;
                tracing::debug!("'{}' is a directory, moving its contents", self.path);
                relocate_tree(self.store, self.branch, &self.path, dest, &mut report)
                    .await
                    .map_err(|e| e.after_steps(operation(), report.commits))?;
            }
        }
        Ok(report)
    }
}
