//! Configuration for connecting to a GitHub-backed store
//!
//! Settings come from a TOML file (`ghkv.toml` by default), then from the
//! environment, then from whatever the caller overrides explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{Result, StoreError};
use crate::retry::RetryPolicy;

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "ghkv.toml";

/// Public GitHub REST endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Environment variables consulted for the access token, in order
pub const TOKEN_ENV_VARS: [&str; 2] = ["GHKV_TOKEN", "GITHUB_TOKEN"];

/// Connection settings for one repository
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Personal access token
    pub token: Option<String>,
    /// Repository owner; resolved from the token's user when absent
    pub owner: Option<String>,
    /// Repository name
    pub repository: String,
    /// Branch every read and commit targets
    pub branch: String,
    /// REST API base URL
    pub api_url: String,
    pub user_agent: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            owner: None,
            repository: String::new(),
            branch: "main".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            user_agent: format!("ghkv/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
        }
    }
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("owner", &self.owner)
            .field("repository", &self.repository)
            .field("branch", &self.branch)
            .field("api_url", &self.api_url)
            .field("user_agent", &self.user_agent)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhkvConfig {
    pub github: GitHubConfig,
    pub retry: RetryPolicy,
}

impl GhkvConfig {
    /// Parse a TOML document
    pub fn from_toml_str(data: &str) -> Result<Self> {
        toml::from_str(data).map_err(|e| StoreError::Config(format!("invalid TOML: {}", e)))
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&data)
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup` (`GHKV_TOKEN`/`GITHUB_TOKEN`,
    /// `GHKV_OWNER`, `GHKV_REPOSITORY`, `GHKV_BRANCH`, `GHKV_API_URL`)
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = TOKEN_ENV_VARS.iter().find_map(|&key| non_empty(key)) {
            self.github.token = Some(token);
        }
        if let Some(owner) = non_empty("GHKV_OWNER") {
            self.github.owner = Some(owner);
        }
        if let Some(repository) = non_empty("GHKV_REPOSITORY") {
            self.github.repository = repository;
        }
        if let Some(branch) = non_empty("GHKV_BRANCH") {
            self.github.branch = branch;
        }
        if let Some(api_url) = non_empty("GHKV_API_URL") {
            self.github.api_url = api_url;
        }
    }

    /// Check that the settings are usable for the GitHub backend
    pub fn validate(&self) -> Result<()> {
        let gh = &self.github;
        if gh.repository.trim().is_empty() {
            return Err(StoreError::Config("no repository configured".to_string()));
        }
        if gh.repository.contains('/') {
            return Err(StoreError::Config(format!(
                "repository '{}' must be a bare name; set the owner separately",
                gh.repository
            )));
        }
        if gh.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err(StoreError::Config(format!(
                "no access token configured (set one of {})",
                TOKEN_ENV_VARS.join(", ")
            )));
        }
        if gh.branch.trim().is_empty() {
            return Err(StoreError::Config("branch cannot be empty".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(StoreError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
