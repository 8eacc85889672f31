//! ghkv Core Library
//!
//! A key-value document store kept in a GitHub repository:
//! - Classes are folders, tables are `{class}/{table}.json` documents
//! - File and folder path entries on top of the contents API
//! - Record store facade (create/insert/update/remove/search)
//! - GitHub REST client with retries, plus an in-memory backend
//! - Repository lifecycle and webhook management
//! - TOML configuration

pub mod config;
pub mod error;
pub mod file;
pub mod folder;
pub mod github;
pub mod hooks;
pub mod memory;
pub mod path;
pub mod remote;
pub mod repo_admin;
pub mod retry;
pub mod store;

pub use config::{GhkvConfig, GitHubConfig};
pub use error::{ErrorKind, Result, StoreError};
pub use file::FileEntry;
pub use folder::{FolderEntry, TreeReport};
pub use github::{GitHubClient, GitHubRepository};
pub use hooks::{Hook, HookConfig, HookManager};
pub use memory::{CommitRecord, MemoryRepository, DEFAULT_BRANCH};
pub use path::{RepoPath, FOLDER_MARKER};
pub use remote::{ContentEntry, ContentStore, Contents, EntryKind, WriteReceipt};
pub use repo_admin::{NewRepository, RepositoryInfo};
pub use retry::RetryPolicy;
pub use store::{Provision, RecordStore, Table};
