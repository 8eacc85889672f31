//! Normalized repository paths
//!
//! GitHub addresses content by slash-separated paths relative to the
//! repository root. [`RepoPath`] keeps them in one canonical form so that
//! `"a/"`, `"/a"` and `"a//"` all name the same directory.

use crate::error::{Result, StoreError};
use std::fmt;

/// Name of the placeholder blob that keeps an otherwise-empty directory alive
pub const FOLDER_MARKER: &str = ".gitkeep";

/// A normalized, slash-separated path inside a repository.
///
/// The empty path is the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RepoPath(String);

impl RepoPath {
    /// Parse and normalize a path.
    ///
    /// Leading, trailing and repeated slashes and `.` segments are dropped.
    /// `..` is rejected because the contents API has no notion of it.
    pub fn new(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(StoreError::InvalidPath(format!(
                        "'{}' contains a '..' segment",
                        raw
                    )));
                }
                s => segments.push(s),
            }
        }
        Ok(Self(segments.join("/")))
    }

    /// The repository root
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Last segment, `None` for the root
    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// Parent directory, `None` for the root
    pub fn parent(&self) -> Option<RepoPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Append a relative path
    pub fn join(&self, rest: &str) -> Result<RepoPath> {
        let rest = RepoPath::new(rest)?;
        if self.is_root() {
            return Ok(rest);
        }
        if rest.is_root() {
            return Ok(self.clone());
        }
        Ok(Self(format!("{}/{}", self.0, rest.0)))
    }

    /// Strip `base` from the front of this path.
    ///
    /// Returns `None` when `base` is not an ancestor (or equal).
    pub fn relative_to(&self, base: &RepoPath) -> Option<RepoPath> {
        if base.is_root() {
            return Some(self.clone());
        }
        if self.0 == base.0 {
            return Some(Self::root());
        }
        self.0
            .strip_prefix(base.0.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .map(|rest| Self(rest.to_string()))
    }

    /// Whether `self` equals `other` or lies underneath it
    pub fn starts_with(&self, other: &RepoPath) -> bool {
        self.relative_to(other).is_some()
    }

    /// Replace the final segment, producing a sibling path
    pub fn with_file_name(&self, name: &str) -> Result<RepoPath> {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(StoreError::InvalidArgument(format!(
                "'{}' is not a single path segment",
                name
            )));
        }
        match self.parent() {
            Some(parent) => parent.join(name),
            None => Err(StoreError::InvalidPath(
                "the repository root cannot be renamed".to_string(),
            )),
        }
    }

    /// Path of the folder marker blob inside this directory
    pub fn marker(&self) -> RepoPath {
        // FOLDER_MARKER is a single valid segment
        if self.is_root() {
            Self(FOLDER_MARKER.to_string())
        } else {
            Self(format!("{}/{}", self.0, FOLDER_MARKER))
        }
    }

    /// Whether this path names a folder marker blob
    pub fn is_marker(&self) -> bool {
        self.file_name() == Some(FOLDER_MARKER)
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for RepoPath {
    type Error = StoreError;

    fn try_from(raw: &str) -> Result<Self> {
        RepoPath::new(raw)
    }
}

impl TryFrom<String> for RepoPath {
    type Error = StoreError;

    fn try_from(raw: String) -> Result<Self> {
        RepoPath::new(&raw)
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
