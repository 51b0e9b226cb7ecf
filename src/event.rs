//! Webhook event classification and payload shapes.

use axum::http::HeaderMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use tracing::{debug, info};

use crate::branch::BRANCH_REF_PREFIX;
use crate::error::{Result, WebhookError};

pub const EVENT_HEADER: &str = "X-GitHub-Event";
pub const DELIVERY_HEADER: &str = "X-GitHub-Delivery";

const FORM_PAYLOAD_PREFIX: &str = "payload=";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Push,
    PullRequest,
    Ping,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
            EventKind::Ping => "ping",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
}

/// The `added` / `removed` / `modified` lists of one commit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitFiles {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub repository: Repository,
    #[serde(default)]
    pub commits: Vec<CommitFiles>,
    /// `null` when a branch is deleted.
    #[serde(default)]
    pub head_commit: Option<CommitFiles>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub href: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestLinks {
    pub commits: Link,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub base: BranchRef,
    pub head: BranchRef,
    #[serde(rename = "_links")]
    pub links: PullRequestLinks,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestPayload {
    pub action: String,
    pub pull_request: PullRequest,
    pub repository: Repository,
}

/// A classified delivery. Threaded through every later stage instead of
/// being looked up again.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    Ping,
    Push(PushPayload),
    PullRequest(PullRequestPayload),
}

impl WebhookEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WebhookEvent::Ping => EventKind::Ping,
            WebhookEvent::Push(_) => EventKind::Push,
            WebhookEvent::PullRequest(_) => EventKind::PullRequest,
        }
    }

    /// The ref used for branch routing: the pushed ref, or the pull request's
    /// base branch as `refs/heads/<base>`.
    pub fn branch_ref(&self) -> Option<String> {
        match self {
            WebhookEvent::Ping => None,
            WebhookEvent::Push(push) => Some(push.git_ref.clone()),
            WebhookEvent::PullRequest(pr) => {
                Some(format!("{}{}", BRANCH_REF_PREFIX, pr.pull_request.base.name))
            }
        }
    }

    pub fn repository_name(&self) -> Option<&str> {
        match self {
            WebhookEvent::Ping => None,
            WebhookEvent::Push(push) => Some(&push.repository.name),
            WebhookEvent::PullRequest(pr) => Some(&pr.repository.name),
        }
    }
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Returns the body as JSON text, unwrapping the legacy
/// `application/x-www-form-urlencoded` form (`payload=<encoded json>`).
pub fn decode_body(body: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(body)
        .map_err(|e| WebhookError::MalformedPayload(format!("body is not UTF-8: {}", e)))?;

    match text.strip_prefix(FORM_PAYLOAD_PREFIX) {
        Some(encoded) => {
            let encoded = encoded.replace('+', " ");
            urlencoding::decode(&encoded)
                .map(|decoded| decoded.into_owned())
                .map_err(|e| WebhookError::MalformedPayload(format!("bad form encoding: {}", e)))
        }
        None => Ok(text.to_string()),
    }
}

fn parse_payload<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let json = decode_body(body)?;
    serde_json::from_str(&json)
        .map_err(|e| WebhookError::MalformedPayload(format!("invalid JSON: {}", e)))
}

/// Classifies a delivery from its `X-GitHub-Event` header and body.
///
/// Closed pull requests and event kinds other than push, pull_request and ping
/// come back as no-action errors.
pub fn classify(headers: &HeaderMap, body: &[u8]) -> Result<WebhookEvent> {
    let event_name =
        header_str(headers, EVENT_HEADER).ok_or(WebhookError::MissingHeader(EVENT_HEADER))?;

    let event = match event_name {
        "ping" => WebhookEvent::Ping,
        "push" => WebhookEvent::Push(parse_payload(body)?),
        "pull_request" => {
            let payload: PullRequestPayload = parse_payload(body)?;
            if payload.action == "closed" {
                return Err(WebhookError::IgnoredAction {
                    event: event_name.to_string(),
                    action: payload.action,
                });
            }
            WebhookEvent::PullRequest(payload)
        }
        other => return Err(WebhookError::UnsupportedEvent(other.to_string())),
    };

    info!("Classified {} event", event.kind());
    if let Some(branch_ref) = event.branch_ref() {
        debug!("Relevant branch ref: {}", branch_ref);
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn headers(event: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(EVENT_HEADER, HeaderValue::from_static(event));
        headers
    }

    fn pr_body(action: &str) -> Vec<u8> {
        json!({
            "action": action,
            "repository": {"name": "mono"},
            "pull_request": {
                "base": {"ref": "master"},
                "head": {"ref": "feature/x"},
                "_links": {"commits": {"href": "https://api.github.com/repos/o/mono/pulls/1/commits"}}
            }
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn ping_needs_no_body() {
        assert!(matches!(classify(&headers("ping"), b"").unwrap(), WebhookEvent::Ping));
    }

    #[test]
    fn push_branch_ref_is_ref_field() {
        let body = json!({
            "ref": "refs/heads/master",
            "repository": {"name": "mono"},
            "commits": [{"added": ["a/b.py"], "removed": [], "modified": []}],
            "head_commit": {"added": [], "removed": [], "modified": []}
        })
        .to_string();
        let event = classify(&headers("push"), body.as_bytes()).unwrap();
        assert_eq!(event.kind(), EventKind::Push);
        assert_eq!(event.branch_ref().as_deref(), Some("refs/heads/master"));
        assert_eq!(event.repository_name(), Some("mono"));
    }

    #[test]
    fn pull_request_branch_ref_is_base() {
        let event = classify(&headers("pull_request"), &pr_body("opened")).unwrap();
        assert_eq!(event.kind(), EventKind::PullRequest);
        assert_eq!(event.branch_ref().as_deref(), Some("refs/heads/master"));
    }

    #[test]
    fn closed_pull_request_is_ignored() {
        let err = classify(&headers("pull_request"), &pr_body("closed")).unwrap_err();
        assert!(matches!(err, WebhookError::IgnoredAction { .. }));
        assert!(err.is_no_action());
    }

    #[test]
    fn unsupported_event() {
        let err = classify(&headers("issues"), b"{}").unwrap_err();
        assert!(matches!(err, WebhookError::UnsupportedEvent(ref e) if e == "issues"));
    }

    #[test]
    fn missing_event_header() {
        let err = classify(&HeaderMap::new(), b"{}").unwrap_err();
        assert!(matches!(err, WebhookError::MissingHeader(EVENT_HEADER)));
    }

    #[test]
    fn malformed_push_body() {
        let err = classify(&headers("push"), b"{not json").unwrap_err();
        assert!(matches!(err, WebhookError::MalformedPayload(_)));
    }

    #[test]
    fn form_encoded_body_is_unwrapped() {
        let json = r#"{"ref": "refs/heads/master", "repository": {"name": "mono repo"}}"#;
        let body = format!("payload={}", urlencoding::encode(json));
        assert_eq!(decode_body(body.as_bytes()).unwrap(), json);

        let event = classify(&headers("push"), body.as_bytes()).unwrap();
        assert_eq!(event.repository_name(), Some("mono repo"));
    }

    #[test]
    fn form_plus_means_space() {
        assert_eq!(decode_body(b"payload=%7B%22a%22%3A+1%7D").unwrap(), r#"{"a": 1}"#);
    }

    #[test]
    fn null_head_commit_is_accepted() {
        let body = r#"{"ref": "refs/heads/master", "repository": {"name": "m"}, "commits": [], "head_commit": null}"#;
        let WebhookEvent::Push(push) = classify(&headers("push"), body.as_bytes()).unwrap() else {
            panic!("expected push");
        };
        assert!(push.head_commit.is_none());
    }
}
