//! Webhook support for ghkv repositories
//!
//! Every commit the record store makes is a `push` on the backing
//! repository, so a webhook is the way to get notified of changes:
//! - list: `GET /repos/{owner}/{repo}/hooks`
//! - create: `POST /repos/{owner}/{repo}/hooks` (always a `web` hook)
//! - delete: `DELETE /repos/{owner}/{repo}/hooks/{id}`

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Result, StoreError};
use crate::github::GitHubRepository;

/// The only hook name GitHub accepts for repository webhooks
const WEB_HOOK_NAME: &str = "web";

/// Events a new hook subscribes to unless told otherwise
pub const DEFAULT_EVENTS: [&str; 1] = ["push"];

/// Delivery settings of a webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookConfig {
    /// Payload URL
    #[serde(default)]
    pub url: String,
    /// `json` or `form`
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// `"0"` verifies TLS certificates, `"1"` does not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_ssl: Option<String>,
}

fn default_content_type() -> String {
    "json".to_string()
}

impl HookConfig {
    /// JSON deliveries to `url`
    pub fn json(url: &str) -> Self {
        Self {
            url: url.to_string(),
            content_type: default_content_type(),
            secret: None,
            insecure_ssl: None,
        }
    }
}

/// A webhook installed on a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    pub id: u64,
    pub name: String,
    pub active: bool,
    pub events: Vec<String>,
    pub config: HookConfig,
    pub created_at: Option<DateTime<Utc>>,
}

/// Manages webhooks for one repository.
pub struct HookManager<'a> {
    repo: &'a GitHubRepository,
}

impl<'a> HookManager<'a> {
    pub fn new(repo: &'a GitHubRepository) -> Self {
        Self { repo }
    }

    /// All webhooks installed on the repository
    pub async fn list(&self) -> Result<Vec<Hook>> {
        let url = self.repo.repo_endpoint(["hooks"])?;
        self.repo.client.send_json(Method::GET, url, None).await
    }

    /// Install a webhook.
    ///
    /// An empty `events` slice subscribes to [`DEFAULT_EVENTS`].
    pub async fn create(&self, config: &HookConfig, events: &[&str], active: bool) -> Result<Hook> {
        if config.url.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "webhook payload URL cannot be empty".to_string(),
            ));
        }
        let events: Vec<&str> = if events.is_empty() {
            DEFAULT_EVENTS.to_vec()
        } else {
            events.to_vec()
        };
        let body = json!({
            "name": WEB_HOOK_NAME,
            "config": config,
            "events": events,
            "active": active,
        });

        let url = self.repo.repo_endpoint(["hooks"])?;
        let hook: Hook = self.repo.client.send_json(Method::POST, url, Some(&body)).await?;
        tracing::info!(
            "Webhook {} created on '{}' for {:?}",
            hook.id,
            self.repo.full_name(),
            hook.events
        );
        Ok(hook)
    }

    /// Remove a webhook by id
    pub async fn delete(&self, id: u64) -> Result<()> {
        let id = id.to_string();
        let url = self.repo.repo_endpoint(["hooks", id.as_str()])?;
        self.repo.client.send(Method::DELETE, url, None).await?;
        tracing::info!("Webhook {} deleted from '{}'", id, self.repo.full_name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_config_serialization() {
        let value = serde_json::to_value(HookConfig::json("https://example.com/hook")).unwrap();
        assert_eq!(value["url"], "https://example.com/hook");
        assert_eq!(value["content_type"], "json");
        assert!(value.get("secret").is_none());
    }

    #[test]
    fn test_parse_hook() {
        let hook: Hook = serde_json::from_str(
            r#"{
                "type": "Repository",
                "id": 12345678,
                "name": "web",
                "active": true,
                "events": ["push", "pull_request"],
                "config": {
                    "content_type": "json",
                    "insecure_ssl": "0",
                    "url": "https://example.com/webhook"
                },
                "updated_at": "2019-06-03T00:57:16Z",
                "created_at": "2019-06-03T00:57:16Z"
            }"#,
        )
        .unwrap();
        assert_eq!(hook.id, 12345678);
        assert_eq!(hook.events, vec!["push", "pull_request"]);
        assert_eq!(hook.config.insecure_ssl.as_deref(), Some("0"));
        assert!(hook.created_at.is_some());
    }
}
