//! Folders on top of a blob-only store
//!
//! Git has no empty directories, so a folder is kept addressable with a
//! zero-byte `.gitkeep` marker. Deleting and moving a folder walk its listing
//! one level at a time and issue one commit per blob; neither is atomic.
//! When a walk fails after some commits went through, the error is returned
//! as [`StoreError::Partial`] so callers can tell a clean failure from a
//! half-applied one.

use std::future::Future;
use std::pin::Pin;

use crate::error::{Result, StoreError};
use crate::path::RepoPath;
use crate::remote::{ContentEntry, ContentStore, Contents, WriteReceipt};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a multi-step delete or move did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeReport {
    /// Source blobs removed (delete) or relocated (move), in commit order
    pub files: Vec<RepoPath>,
    /// Commits made, markers included
    pub commits: usize,
}

/// A directory in the remote repository
pub struct FolderEntry<'r> {
    store: &'r dyn ContentStore,
    path: RepoPath,
    branch: &'r str,
}

impl<'r> FolderEntry<'r> {
    pub fn new(store: &'r dyn ContentStore, path: RepoPath, branch: &'r str) -> Self {
        Self {
            store,
            path,
            branch,
        }
    }

    pub fn path(&self) -> &RepoPath {
        &self.path
    }

    /// Whether listing this path yields a directory
    pub async fn exists(&self) -> Result<bool> {
        match self.store.get(&self.path, self.branch).await {
            Ok(Contents::Dir(_)) => Ok(true),
            Ok(Contents::File(_)) => Ok(false),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Immediate children of this folder
    pub async fn list(&self) -> Result<Vec<ContentEntry>> {
        self.store
            .get(&self.path, self.branch)
            .await?
            .into_dir(&self.path)
    }

    /// Create the folder by committing its marker blob
    pub async fn create(&self) -> Result<WriteReceipt> {
        if self.path.is_root() {
            return Err(StoreError::InvalidPath(
                "the repository root always exists".to_string(),
            ));
        }
        let message = format!("Create folder '{}'", self.path);
        let receipt = self
            .store
            .create_file(&self.path.marker(), b"", &message, self.branch)
            .await?;
        tracing::info!("Folder '{}' created with {}", self.path, self.path.marker());
        Ok(receipt)
    }

    /// Delete every blob under this folder, depth first in listing order
    pub async fn delete(&self) -> Result<TreeReport> {
        let mut report = TreeReport::default();
        delete_tree(self.store, self.branch, &self.path, &mut report)
            .await
            .map_err(|e| e.after_steps(format!("delete '{}'", self.path), report.commits))?;
        tracing::info!(
            "Folder '{}' deleted ({} file(s))",
            self.path,
            report.files.len()
        );
        Ok(report)
    }

    /// Relocate every blob under this folder to the same relative path
    /// under `new_path`
    pub async fn move_to(&self, new_path: &RepoPath) -> Result<TreeReport> {
        check_tree_move(&self.path, new_path)?;
        let mut report = TreeReport::default();
        relocate_tree(self.store, self.branch, &self.path, new_path, &mut report)
            .await
            .map_err(|e| {
                e.after_steps(
                    format!("move '{}' to '{}'", self.path, new_path),
                    report.commits,
                )
            })?;
        tracing::info!("Folder '{}' moved to '{}'", self.path, new_path);
        Ok(report)
    }

    /// Move to a sibling path named `new_name`
    pub async fn rename(&self, new_name: &str) -> Result<TreeReport> {
        let new_path = self.path.with_file_name(new_name)?;
        self.move_to(&new_path).await
    }
}

/// Reject moves that would walk into their own output
pub(crate) fn check_tree_move(from: &RepoPath, to: &RepoPath) -> Result<()> {
    if from.is_root() {
        return Err(StoreError::InvalidPath(
            "the repository root cannot be moved".to_string(),
        ));
    }
    if to.starts_with(from) {
        return Err(StoreError::InvalidArgument(format!(
            "cannot move '{}' into itself ('{}')",
            from, to
        )));
    }
    Ok(())
}

fn delete_tree<'a>(
    store: &'a dyn ContentStore,
    branch: &'a str,
    dir: &'a RepoPath,
    report: &'a mut TreeReport,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let entries = store.get(dir, branch).await?.into_dir(dir)?;
        for entry in entries {
            if entry.is_dir() {
                delete_tree(store, branch, &entry.path, report).await?;
                continue;
            }
            let message = format!("Delete '{}'", entry.path);
            store
                .delete_file(&entry.path, &entry.sha, &message, branch)
                .await?;
            report.commits += 1;
            tracing::info!("Deleted file '{}'", entry.path);
            report.files.push(entry.path);
        }
        remove_residual_marker(store, branch, dir, report).await;
        Ok(())
    })
}

pub(crate) fn relocate_tree<'a>(
    store: &'a dyn ContentStore,
    branch: &'a str,
    from: &'a RepoPath,
    to: &'a RepoPath,
    report: &'a mut TreeReport,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let entries = store.get(from, branch).await?.into_dir(from)?;
        if entries.is_empty() {
            return Err(StoreError::NotFound(format!("folder '{}' is empty", from)));
        }
        for entry in entries {
            let dest = to.join(&entry.name)?;
            if entry.is_dir() {
                relocate_tree(store, branch, &entry.path, &dest, report).await?;
            } else {
                let blob = store
                    .get(&entry.path, branch)
                    .await?
                    .into_file(&entry.path)?;
                relocate_blob(store, branch, blob, &dest, report).await?;
            }
        }
        remove_residual_marker(store, branch, from, report).await;
        Ok(())
    })
}

/// Copy a fetched blob to `to`, then delete the original
pub(crate) async fn relocate_blob(
    store: &dyn ContentStore,
    branch: &str,
    blob: ContentEntry,
    to: &RepoPath,
    report: &mut TreeReport,
) -> Result<()> {
    let content = blob.content.as_deref().ok_or_else(|| {
        StoreError::Decode(format!("no content returned for '{}'", blob.path))
    })?;

    let message = format!("Move '{}' to '{}'", blob.path, to);
    store.create_file(to, content, &message, branch).await?;
    report.commits += 1;

    let message = format!("Delete '{}' after move", blob.path);
    store
        .delete_file(&blob.path, &blob.sha, &message, branch)
        .await?;
    report.commits += 1;

    tracing::info!("Moved file '{}' -> '{}'", blob.path, to);
    report.files.push(blob.path);
    Ok(())
}

/// Best-effort removal of a leftover marker blob in `dir`
async fn remove_residual_marker(
    store: &dyn ContentStore,
    branch: &str,
    dir: &RepoPath,
    report: &mut TreeReport,
) {
    let marker = dir.marker();
    let sha = match store.get(&marker, branch).await {
        Ok(Contents::File(entry)) => entry.sha,
        Ok(Contents::Dir(_)) => return,
        Err(e) if e.is_not_found() => return,
        Err(e) => {
            tracing::warn!("Could not inspect folder marker '{}': {}", marker, e);
            return;
        }
    };
    let message = format!("Remove folder marker '{}'", marker);
    match store.delete_file(&marker, &sha, &message, branch).await {
        Ok(_) => {
            report.commits += 1;
            tracing::info!("Deleted folder marker '{}'", marker);
        }
        Err(e) => tracing::warn!("Could not remove folder marker '{}': {}", marker, e),
    }
}
