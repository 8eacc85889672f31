//! GitHub REST client
//!
//! Implements [`ContentStore`] on top of the repository contents API:
//! - `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}`
//! - `PUT /repos/{owner}/{repo}/contents/{path}` (create / update)
//! - `DELETE /repos/{owner}/{repo}/contents/{path}`
//!
//! Reads are retried under the configured [`RetryPolicy`]. A write that
//! fails transiently is read back first and only resent when it did not land.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Method, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

use crate::config::GitHubConfig;
use crate::error::{Result, StoreError};
use crate::path::RepoPath;
use crate::remote::{ContentEntry, ContentStore, Contents, EntryKind, WriteReceipt};
use crate::retry::RetryPolicy;

/// Media type GitHub recommends for REST v3
const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Pinned REST API version
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Account-level GitHub client.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: Url,
    token: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url.as_str())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiContent {
    name: String,
    path: String,
    sha: String,
    #[serde(rename = "type")]
    kind: EntryKind,
    #[serde(default)]
    size: u64,
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiContents {
    Dir(Vec<ApiContent>),
    File(ApiContent),
}

#[derive(Debug, Deserialize)]
struct ApiWrite {
    content: Option<ApiWriteContent>,
    commit: ApiCommit,
}

#[derive(Debug, Deserialize)]
struct ApiWriteContent {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiBlob {
    content: String,
    encoding: String,
}

/// Decode GitHub's base64, which is wrapped with newlines
fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(BASE64.decode(cleaned)?)
}

/// Turn a non-success response into a [`StoreError`]
async fn error_from_response(resp: Response) -> StoreError {
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::CONFLICT => StoreError::Conflict(message),
        // Validation failure; contents writes turn it into a conflict
        StatusCode::UNPROCESSABLE_ENTITY => StoreError::InvalidArgument(message),
        StatusCode::UNAUTHORIZED => StoreError::Unauthorized(message),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
            if status == StatusCode::TOO_MANY_REQUESTS
                || header("x-ratelimit-remaining").as_deref() == Some("0") =>
        {
            StoreError::RateLimited {
                reset: header("x-ratelimit-reset").and_then(|v| v.parse().ok()),
            }
        }
        _ => StoreError::Remote {
            status: status.as_u16(),
            message,
        },
    }
}

impl GitHubClient {
    /// Build a client from configuration. No request is made.
    pub fn new(config: &GitHubConfig, retry: RetryPolicy) -> Result<Self> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| StoreError::Config("an access token is required".to_string()))?;
        let api_url = Url::parse(&config.api_url)
            .map_err(|e| StoreError::Config(format!("invalid api_url '{}': {}", config.api_url, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_MEDIA_TYPE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| StoreError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url,
            token,
            retry,
        })
    }

    /// Build an API URL from path segments (each segment is percent-encoded)
    pub(crate) fn endpoint<I>(&self, segments: I) -> Result<Url>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Config(format!("'{}' cannot be a base URL", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and return the successful response.
    ///
    /// Only `GET` goes through the retry policy. A write whose response was
    /// lost may already be committed, so it is never replayed blindly here.
    pub(crate) async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Response> {
        if method != Method::GET {
            return self.send_once(&method, &url, body).await;
        }
        let what = format!("{} {}", method, url.path());
        let (client, method, url) = (self, &method, &url);
        self.retry
            .run(&what, || async move { client.send_once(method, url, body).await })
            .await
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<Response> {
        tracing::debug!("GitHub request: {} {}", method, url);
        let mut req = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(&self.token);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(error_from_response(resp).await)
        }
    }

    /// Send a request and decode its JSON response
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<T> {
        let resp = self.send(method, url, body).await?;
        Ok(resp.json().await?)
    }

    /// Login of the user the token belongs to
    pub async fn current_user(&self) -> Result<String> {
        let url = self.endpoint(["user"])?;
        let user: ApiUser = self.send_json(Method::GET, url, None).await?;
        Ok(user.login)
    }

    /// Handle for `owner/name` without contacting GitHub
    pub fn repository(&self, owner: &str, name: &str) -> GitHubRepository {
        GitHubRepository {
            client: self.clone(),
            owner: owner.to_string(),
            name: name.to_string(),
        }
    }

    /// Connect to a repository, failing if it cannot be reached.
    ///
    /// When `owner` is `None` the repository is looked up under the user the
    /// token belongs to.
    pub async fn open_repository(&self, owner: Option<&str>, name: &str) -> Result<GitHubRepository> {
        let owner = match owner {
            Some(owner) => owner.to_string(),
            None => self.current_user().await?,
        };
        let repo = self.repository(&owner, name);
        let info = repo.info().await?;
        tracing::info!(
            "Connected to repository '{}' (default branch '{}')",
            info.full_name,
            info.default_branch
        );
        Ok(repo)
    }

    /// Build a client and connect to the configured repository
    pub async fn connect(config: &GitHubConfig, retry: RetryPolicy) -> Result<GitHubRepository> {
        let client = Self::new(config, retry)?;
        client
            .open_repository(config.owner.as_deref(), &config.repository)
            .await
    }
}

/// One repository reached through a [`GitHubClient`]
#[derive(Debug, Clone)]
pub struct GitHubRepository {
    pub(crate) client: GitHubClient,
    pub(crate) owner: String,
    pub(crate) name: String,
}

impl GitHubRepository {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn client(&self) -> &GitHubClient {
        &self.client
    }

    /// URL under `/repos/{owner}/{name}/`
    pub(crate) fn repo_endpoint<I>(&self, rest: I) -> Result<Url>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self
            .client
            .endpoint(["repos", self.owner.as_str(), self.name.as_str()])?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Config("api_url cannot be a base URL".to_string()))?
            .extend(rest);
        Ok(url)
    }

    fn contents_url(&self, path: &RepoPath) -> Result<Url> {
        self.repo_endpoint(std::iter::once("contents").chain(path.segments()))
    }

    /// Fetch blob content by SHA (used for files over 1 MB)
    async fn get_blob(&self, sha: &str) -> Result<Vec<u8>> {
        let url = self.repo_endpoint(["git", "blobs", sha])?;
        let blob: ApiBlob = self.client.send_json(Method::GET, url, None).await?;
        match blob.encoding.as_str() {
            "base64" => decode_base64(&blob.content),
            "utf-8" => Ok(blob.content.into_bytes()),
            other => Err(StoreError::Decode(format!(
                "unsupported blob encoding '{}'",
                other
            ))),
        }
    }

    fn entry(&self, api: ApiContent, content: Option<Vec<u8>>) -> Result<ContentEntry> {
        Ok(ContentEntry {
            path: RepoPath::new(&api.path)?,
            name: api.name,
            sha: api.sha,
            kind: api.kind,
            size: api.size,
            content,
        })
    }

    /// Commit a contents write.
    ///
    /// `expected` is the content the path should hold afterwards (`None` for
    /// a delete) and `base_sha` the revision the write replaces. When the
    /// response is lost to a transient failure the path is read back: a
    /// write that landed counts as done, one that did not is sent again.
    async fn write(
        &self,
        method: Method,
        path: &RepoPath,
        branch: &str,
        body: Value,
        expected: Option<&[u8]>,
        base_sha: Option<&str>,
    ) -> Result<WriteReceipt> {
        let url = self.contents_url(path)?;
        let retry = &self.client.retry;
        let attempts = retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match self
                .client
                .send_json::<ApiWrite>(method.clone(), url.clone(), Some(&body))
                .await
            {
                Ok(written) => {
                    return Ok(WriteReceipt {
                        content_sha: written.content.map(|c| c.sha),
                        commit_sha: Some(written.commit.sha),
                    });
                }
                // 422 on contents means the file exists or the sha is missing
                Err(StoreError::InvalidArgument(message)) => {
                    return Err(StoreError::Conflict(message));
                }
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            match self.reconcile(path, branch, expected, base_sha).await {
                WriteState::Applied(receipt) => {
                    tracing::info!("{} '{}' was committed despite: {}", method, path, err);
                    return Ok(receipt);
                }
                WriteState::Pending if attempt < attempts => {
                    let delay = retry.backoff(attempt);
                    tracing::warn!(
                        "{} '{}' failed (attempt {}/{}), retrying in {:?}: {}",
                        method,
                        path,
                        attempt,
                        attempts,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                _ => return Err(err),
            }
        }
    }

    /// Read `path` back to find out whether a write landed
    async fn reconcile(
        &self,
        path: &RepoPath,
        branch: &str,
        expected: Option<&[u8]>,
        base_sha: Option<&str>,
    ) -> WriteState {
        let current = match self.get(path, branch).await {
            Ok(Contents::File(entry)) => Some(entry),
            Ok(Contents::Dir(_)) => return WriteState::Diverged,
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                tracing::warn!("Could not read back '{}': {}", path, e);
                return WriteState::Diverged;
            }
        };
        match (expected, current) {
            (Some(content), Some(entry)) if entry.content.as_deref() == Some(content) => {
                WriteState::Applied(WriteReceipt {
                    content_sha: Some(entry.sha),
                    commit_sha: None,
                })
            }
            (None, None) => WriteState::Applied(WriteReceipt {
                content_sha: None,
                commit_sha: None,
            }),
            (_, Some(entry)) if base_sha == Some(entry.sha.as_str()) => WriteState::Pending,
            (Some(_), None) if base_sha.is_none() => WriteState::Pending,
            _ => WriteState::Diverged,
        }
    }
}

/// Where a write stands after its response was lost
enum WriteState {
    Applied(WriteReceipt),
    /// The path still holds the revision the write was based on
    Pending,
    /// Someone else changed the path in the meantime
    Diverged,
}

#[async_trait]
impl ContentStore for GitHubRepository {
    async fn get(&self, path: &RepoPath, branch: &str) -> Result<Contents> {
        let mut url = self.contents_url(path)?;
        url.query_pairs_mut().append_pair("ref", branch);
        let contents: ApiContents = self.client.send_json(Method::GET, url, None).await?;

        match contents {
            ApiContents::Dir(items) => items
                .into_iter()
                .map(|item| self.entry(item, None))
                .collect::<Result<Vec<_>>>()
                .map(Contents::Dir),
            ApiContents::File(item) => {
                let data = match (item.encoding.as_deref(), item.content.as_deref()) {
                    (Some("base64"), Some(content)) if !content.is_empty() || item.size == 0 => {
                        decode_base64(content)?
                    }
                    // Large files come back without inline content
                    _ if item.kind == EntryKind::File => self.get_blob(&item.sha).await?,
                    _ => Vec::new(),
                };
                Ok(Contents::File(self.entry(item, Some(data))?))
            }
        }
    }

    async fn create_file(
        &self,
        path: &RepoPath,
        content: &[u8],
        message: &str,
        branch: &str,
    ) -> Result<WriteReceipt> {
        let body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": branch,
        });
        self.write(Method::PUT, path, branch, body, Some(content), None).await
    }

    async fn update_file(
        &self,
        path: &RepoPath,
        content: &[u8],
        sha: &str,
        message: &str,
        branch: &str,
    ) -> Result<WriteReceipt> {
        let body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "sha": sha,
            "branch": branch,
        });
        self.write(Method::PUT, path, branch, body, Some(content), Some(sha)).await
    }

    async fn delete_file(
        &self,
        path: &RepoPath,
        sha: &str,
        message: &str,
        branch: &str,
    ) -> Result<WriteReceipt> {
        let body = json!({
            "message": message,
            "sha": sha,
            "branch": branch,
        });
        self.write(Method::DELETE, path, branch, body, None, Some(sha)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_url: &str) -> GitHubClient {
        let config = GitHubConfig {
            token: Some("ghp_test".to_string()),
            api_url: api_url.to_string(),
            ..GitHubConfig::default()
        };
        GitHubClient::new(&config, RetryPolicy::none()).unwrap()
    }

    #[test]
    fn test_decode_base64_with_newlines() {
        let wrapped = "eyJr\nMSI6\nICJ2MSJ9\n";
        assert_eq!(decode_base64(wrapped).unwrap(), br#"{"k1": "v1"}"#);
        assert!(decode_base64("!!!").is_err());
    }

    #[test]
    fn test_requires_token() {
        let err = GitHubClient::new(&GitHubConfig::default(), RetryPolicy::none()).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_contents_url_encodes_segments() {
        let repo = client("https://api.github.com").repository("octocat", "records");
        let url = repo
            .contents_url(&RepoPath::new("My Class/t#1.json").unwrap())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octocat/records/contents/My%20Class/t%231.json"
        );
        let root = repo.contents_url(&RepoPath::root()).unwrap();
        assert_eq!(
            root.as_str(),
            "https://api.github.com/repos/octocat/records/contents"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let c = client("https://ghe.example.com/api/v3/");
        assert_eq!(
            c.endpoint(["user"]).unwrap().as_str(),
            "https://ghe.example.com/api/v3/user"
        );
    }

    #[test]
    fn test_parse_contents_shapes() {
        let dir: ApiContents = serde_json::from_str(
            r#"[{"name":"x.json","path":"a/x.json","sha":"abc","type":"file","size":2},
                {"name":"sub","path":"a/sub","sha":"def","type":"dir","size":0}]"#,
        )
        .unwrap();
        match dir {
            ApiContents::Dir(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[1].kind, EntryKind::Dir);
            }
            ApiContents::File(_) => panic!("expected a listing"),
        }

        let file: ApiContents = serde_json::from_str(
            r#"{"name":"t.json","path":"C/t.json","sha":"abc","type":"file","size":2,
                "content":"e30=\n","encoding":"base64"}"#,
        )
        .unwrap();
        assert!(matches!(file, ApiContents::File(_)));
    }
}
