//! Change set resolution: the flat list of file paths touched by a delivery.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, WebhookError};
use crate::event::{CommitFiles, PullRequestPayload, PushPayload};

/// Ordered list of touched paths. May contain duplicates, never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet(Vec<String>);

impl ChangeSet {
    pub fn new(paths: Vec<String>) -> Result<Self> {
        if paths.is_empty() {
            return Err(WebhookError::NoChanges);
        }
        Ok(Self(paths))
    }

    pub fn paths(&self) -> &[String] {
        &self.0
    }
}

fn extend_with(paths: &mut Vec<String>, commit: &CommitFiles) {
    paths.extend(commit.added.iter().cloned());
    paths.extend(commit.removed.iter().cloned());
    paths.extend(commit.modified.iter().cloned());
}

/// Collects added, removed and modified paths of every pushed commit, then
/// those of the head commit.
pub fn from_push(payload: &PushPayload) -> Result<ChangeSet> {
    let mut paths = Vec::new();
    for commit in &payload.commits {
        extend_with(&mut paths, commit);
    }
    if let Some(head) = &payload.head_commit {
        extend_with(&mut paths, head);
    }

    debug!("Touched files: {:?}", paths);
    ChangeSet::new(paths)
}

/// Entry of a pull request's commit listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitRef {
    #[serde(default)]
    pub sha: String,
    /// API URL of the single-commit resource.
    pub url: String,
}

/// Read access to the commit-listing service.
#[async_trait]
pub trait CommitSource: Send + Sync {
    /// Lists the commits behind a pull request's `_links.commits.href`.
    async fn list_commits(&self, commits_url: &str, credential: Option<&str>)
    -> Result<Vec<CommitRef>>;

    /// Lists the file names touched by one commit.
    async fn commit_files(&self, commit_url: &str, credential: Option<&str>) -> Result<Vec<String>>;
}

/// Collects the files of every commit of a pull request, one request per
/// commit, in commit order.
pub async fn from_pull_request(
    payload: &PullRequestPayload,
    source: &dyn CommitSource,
    credential: Option<&str>,
) -> Result<ChangeSet> {
    let commits_url = &payload.pull_request.links.commits.href;
    let commits = source.list_commits(commits_url, credential).await?;
    info!("Pull request has {} commit(s)", commits.len());

    let mut paths = Vec::new();
    for commit in &commits {
        let files = source.commit_files(&commit.url, credential).await?;
        debug!("Commit {} touched {} file(s)", commit.sha, files.len());
        paths.extend(files);
    }

    ChangeSet::new(paths)
}
