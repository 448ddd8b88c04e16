use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use nd_core::{Error, PublishReceipt, Publisher, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";
const BOT_USER_AGENT: &str = "News-Generator-Bot";

#[derive(Clone)]
pub struct GitHubConfig {
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub api_url: String,
}

impl GitHubConfig {
    pub fn new(token: impl Into<String>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            branch: "main".to_string(),
            api_url: GITHUB_API_URL.to_string(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &"<redacted>")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ContentMetadata {
    sha: String,
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    branch: &'a str,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    content: Option<ContentMetadata>,
}

/// Publishes through the GitHub contents API.
///
/// The update carries the blob sha read just before it, so a concurrent
/// writer makes GitHub reject the write instead of being overwritten.
#[derive(Debug)]
pub struct GitHubPublisher {
    client: Client,
    config: GitHubConfig,
}

impl GitHubPublisher {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(Error::Config("GITHUB_TOKEN is required".to_string()));
        }
        Ok(Self {
            client: Client::new(),
            config,
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_url,
            self.config.owner,
            self.config.repo,
            path.trim_start_matches('/')
        )
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.config.token))
                .map_err(|e| Error::Config(format!("Invalid token header: {}", e)))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        headers.insert(USER_AGENT, HeaderValue::from_static(BOT_USER_AGENT));
        Ok(headers)
    }

    /// Current blob sha of `path` on the target branch, or `None` if absent.
    pub async fn current_revision(&self, path: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.contents_url(path))
            .headers(self.headers()?)
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let metadata: ContentMetadata = response.json().await?;
                Ok(Some(metadata.sha))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await?;
                error!(%status, body = %body, "GitHub metadata request failed");
                Err(Error::Publish {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[async_trait]
impl Publisher for GitHubPublisher {
    async fn publish(&self, path: &str, content: &[u8], message: &str) -> Result<PublishReceipt> {
        info!("📤 Publishing {} to {}/{}", path, self.config.owner, self.config.repo);
        let previous = self.current_revision(path).await?;

        let request = UpdateRequest {
            message,
            content: base64::engine::general_purpose::STANDARD.encode(content),
            sha: previous.as_deref(),
            branch: &self.config.branch,
        };

        let response = self
            .client
            .put(self.contents_url(path))
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            error!(%status, "GitHub API error: {}", body);
            return Err(Error::Publish {
                status: status.as_u16(),
                body,
            });
        }

        let update: UpdateResponse = response.json().await?;
        info!("✅ Published {} ({} bytes)", path, content.len());
        Ok(PublishReceipt {
            path: path.to_string(),
            previous_revision: previous,
            revision: update.content.map(|c| c.sha),
        })
    }
}
