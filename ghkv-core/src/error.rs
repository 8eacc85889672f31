//! Error types shared by every layer of ghkv
//!
//! Remote failures, path-entry failures and record-level failures all funnel
//! into [`StoreError`] so callers can tell "already exists", "not found" and
//! "transport failure" apart without parsing log text.

/// Result type for ghkv operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while talking to the remote repository
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Record '{name}' does not exist in table '{table}'")]
    RecordNotFound { table: String, name: String },

    #[error("Record '{name}' already exists in table '{table}'")]
    RecordExists { table: String, name: String },

    #[error("Malformed document '{path}': {reason}")]
    Malformed { path: String, reason: String },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited by remote (reset at {reset:?})")]
    RateLimited { reset: Option<u64> },

    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{operation} failed after {completed} committed step(s): {source}")]
    Partial {
        operation: String,
        completed: usize,
        #[source]
        source: Box<StoreError>,
    },
}

/// Coarse classification of a [`StoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Malformed,
    Invalid,
    Remote,
    Partial,
}

impl StoreError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) | StoreError::RecordNotFound { .. } => ErrorKind::NotFound,
            StoreError::Conflict(_) | StoreError::RecordExists { .. } => ErrorKind::Conflict,
            StoreError::Malformed { .. } | StoreError::Decode(_) => ErrorKind::Malformed,
            StoreError::InvalidPath(_)
            | StoreError::InvalidArgument(_)
            | StoreError::Config(_) => ErrorKind::Invalid,
            StoreError::Partial { .. } => ErrorKind::Partial,
            StoreError::Unauthorized(_)
            | StoreError::RateLimited { .. }
            | StoreError::Remote { .. }
            | StoreError::Transport(_)
            | StoreError::Serialization(_) => ErrorKind::Remote,
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transport(_) | StoreError::RateLimited { .. } => true,
            StoreError::Remote { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Wrap `self` as the failure of a multi-step operation.
    ///
    /// Nothing is wrapped when no step was committed yet: the remote is
    /// unchanged and the original error is returned as-is.
    pub(crate) fn after_steps(self, operation: impl Into<String>, completed: usize) -> Self {
        if completed == 0 {
            return self;
        }
        match self {
            StoreError::Partial {
                operation,
                completed: inner,
                source,
            } => StoreError::Partial {
                operation,
                completed: completed + inner,
                source,
            },
            other => StoreError::Partial {
                operation: operation.into(),
                completed,
                source: Box::new(other),
            },
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            StoreError::Remote {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            StoreError::Decode(e.to_string())
        } else {
            StoreError::Transport(e.to_string())
        }
    }
}

impl From<base64::DecodeError> for StoreError {
    fn from(e: base64::DecodeError) -> Self {
        StoreError::Decode(format!("invalid base64 content: {}", e))
    }
}

impl From<std::string::FromUtf8Error> for StoreError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        StoreError::Decode(format!("content is not valid UTF-8: {}", e))
    }
}
