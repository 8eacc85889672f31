//! Repository lifecycle management
//!
//! Create, inspect, rename and delete the repository that backs a store:
//! - `POST /user/repos`
//! - `GET /repos/{owner}/{repo}`
//! - `PATCH /repos/{owner}/{repo}`
//! - `DELETE /repos/{owner}/{repo}`

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Result, StoreError};
use crate::github::{GitHubClient, GitHubRepository};

/// Repository information for display and API responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub private: bool,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Request body for creating a repository
#[derive(Debug, Clone, Serialize)]
pub struct NewRepository {
    pub name: String,
    pub private: bool,
    pub description: String,
    /// Create an initial commit so the default branch exists
    pub auto_init: bool,
}

impl NewRepository {
    /// A private repository with an initial commit
    pub fn private(name: &str) -> Self {
        Self {
            name: name.to_string(),
            private: true,
            description: String::new(),
            auto_init: true,
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::InvalidArgument(
            "repository name cannot be empty".to_string(),
        ));
    }
    if name.contains('/') {
        return Err(StoreError::InvalidArgument(format!(
            "repository name '{}' cannot contain '/'",
            name
        )));
    }
    Ok(())
}

impl GitHubClient {
    /// Create a repository owned by the authenticated user
    pub async fn create_repository(&self, request: &NewRepository) -> Result<GitHubRepository> {
        validate_name(&request.name)?;
        let url = self.endpoint(["user", "repos"])?;
        let body = serde_json::to_value(request)?;
        let info: RepositoryInfo = self.send_json(Method::POST, url, Some(&body)).await?;
        tracing::info!("Repository '{}' created", info.full_name);

        let owner = info
            .full_name
            .split_once('/')
            .map(|(owner, _)| owner.to_string())
            .ok_or_else(|| {
                StoreError::Decode(format!("unexpected full_name '{}'", info.full_name))
            })?;
        Ok(self.repository(&owner, &info.name))
    }
}

impl GitHubRepository {
    /// Fetch repository metadata
    pub async fn info(&self) -> Result<RepositoryInfo> {
        let url = self.repo_endpoint(std::iter::empty::<&str>())?;
        self.client.send_json(Method::GET, url, None).await
    }

    /// Rename the repository; this handle follows the new name
    pub async fn rename(&mut self, new_name: &str) -> Result<RepositoryInfo> {
        validate_name(new_name)?;
        let url = self.repo_endpoint(std::iter::empty::<&str>())?;
        let body = json!({ "name": new_name });
        let info: RepositoryInfo = self.client.send_json(Method::PATCH, url, Some(&body)).await?;
        tracing::info!("Repository '{}' renamed to '{}'", self.full_name(), info.name);
        self.name = info.name.clone();
        Ok(info)
    }

    /// Delete the repository and everything in it
    pub async fn delete(self) -> Result<()> {
        let url = self.repo_endpoint(std::iter::empty::<&str>())?;
        self.client.send(Method::DELETE, url, None).await?;
        tracing::info!("Repository '{}' deleted", self.full_name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repository_info() {
        let info: RepositoryInfo = serde_json::from_str(
            r#"{
                "id": 1296269,
                "name": "records",
                "full_name": "octocat/records",
                "description": null,
                "private": true,
                "html_url": "https://github.com/octocat/records",
                "created_at": "2011-01-26T19:01:12Z",
                "default_branch": "trunk"
            }"#,
        )
        .unwrap();
        assert_eq!(info.full_name, "octocat/records");
        assert!(info.private);
        assert_eq!(info.description, None);
        assert_eq!(info.default_branch, "trunk");
        assert_eq!(info.created_at.to_rfc3339(), "2011-01-26T19:01:12+00:00");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("records").is_ok());
        assert!(validate_name("  ").is_err());
        assert!(validate_name("a/b").is_err());
    }

    #[test]
    fn test_new_repository_body() {
        let body = serde_json::to_value(NewRepository::private("API")).unwrap();
        assert_eq!(body["name"], "API");
        assert_eq!(body["private"], true);
        assert_eq!(body["auto_init"], true);
    }
}
