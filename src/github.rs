//! Commit listing over the GitHub REST API.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::changeset::{CommitRef, CommitSource};
use crate::error::{Result, WebhookError};

const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("monorepo_webhook/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    files: Vec<CommitFile>,
}

#[derive(Debug, Deserialize)]
struct CommitFile {
    filename: String,
}

/// [`CommitSource`] backed by `reqwest`. Requests are authenticated with the
/// bearer credential passed per call.
#[derive(Debug, Clone)]
pub struct GitHubCommitClient {
    http: reqwest::Client,
}

impl GitHubCommitClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub fn with_defaults() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| WebhookError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::new(http))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, credential: Option<&str>) -> Result<T> {
        debug!("GET {}", url);
        let mut request = self.http.get(url).header(ACCEPT, GITHUB_MEDIA_TYPE);
        if let Some(token) = credential {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl CommitSource for GitHubCommitClient {
    async fn list_commits(
        &self,
        commits_url: &str,
        credential: Option<&str>,
    ) -> Result<Vec<CommitRef>> {
        self.get_json(commits_url, credential).await
    }

    async fn commit_files(&self, commit_url: &str, credential: Option<&str>) -> Result<Vec<String>> {
        let detail: CommitDetail = self.get_json(commit_url, credential).await?;
        Ok(detail.files.into_iter().map(|f| f.filename).collect())
    }
}
