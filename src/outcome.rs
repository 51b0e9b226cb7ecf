//! Result of one delivery and its HTTP rendering.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dispatch::DispatchResult;
use crate::error::WebhookError;
use crate::naming::PipelineName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `ping` delivery.
    Acknowledged,
    /// Valid delivery that needs no pipeline; carries the reason.
    NoAction(String),
    Dispatched(DispatchResult),
    /// Offline or dry-run: the pipelines that would have been started.
    Offline(Vec<PipelineName>),
}

fn format_names(names: &[PipelineName]) -> String {
    let joined: Vec<&str> = names.iter().map(PipelineName::as_str).collect();
    format!("[{}]", joined.join(", "))
}

impl Outcome {
    pub fn no_action(reason: &WebhookError) -> Self {
        match reason {
            WebhookError::UnsupportedEvent(_) | WebhookError::IgnoredAction { .. } => {
                Outcome::NoAction(reason.to_string())
            }
            _ => Outcome::NoAction(format!("Not started any CodePipelines. {}", reason)),
        }
    }

    /// Some pipelines were missing (or could not be retargeted) and others
    /// started. Reported as 202 Accepted with the lists kept apart.
    pub fn is_partial(&self) -> bool {
        matches!(self, Outcome::Dispatched(result) if !result.is_complete())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Outcome::Acknowledged | Outcome::Offline(_) => StatusCode::OK,
            Outcome::NoAction(_) => StatusCode::ACCEPTED,
            Outcome::Dispatched(result) if result.is_complete() => StatusCode::OK,
            Outcome::Dispatched(_) => StatusCode::ACCEPTED,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Acknowledged => "ping",
            Outcome::NoAction(_) => "no_action",
            Outcome::Dispatched(result) if result.is_complete() => "started",
            Outcome::Dispatched(_) => "partial",
            Outcome::Offline(_) => "offline",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Outcome::Acknowledged => "Ping received.".to_string(),
            Outcome::NoAction(reason) => reason.clone(),
            Outcome::Dispatched(result) => {
                let mut message = format!("Started CodePipelines {}.", format_names(&result.started));
                if !result.not_found.is_empty() {
                    message.push_str(&format!(
                        " Could not start CodePipelines {}.",
                        format_names(&result.not_found)
                    ));
                }
                if !result.not_retargeted.is_empty() {
                    message.push_str(&format!(
                        " Could not modify CodePipelines {}.",
                        format_names(&result.not_retargeted)
                    ));
                }
                message
            }
            Outcome::Offline(names) => {
                format!("Currently offline, but the pipelines are: {}.", format_names(names))
            }
        }
    }
}

/// JSON body returned for every delivery.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: u16,
    pub message: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipelines: Option<DispatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned: Option<Vec<PipelineName>>,
}

impl WebhookResponse {
    pub fn from_outcome(outcome: Outcome, delivery_id: Option<String>) -> Self {
        let status = outcome.status_code().as_u16();
        let message = outcome.message();
        let label = outcome.label();
        let (pipelines, planned) = match outcome {
            Outcome::Dispatched(result) => (Some(result), None),
            Outcome::Offline(names) => (None, Some(names)),
            _ => (None, None),
        };
        Self {
            status,
            message,
            outcome: label,
            delivery_id,
            timestamp: Utc::now(),
            pipelines,
            planned,
        }
    }

    pub fn from_error(error: &WebhookError, delivery_id: Option<String>) -> Self {
        Self {
            status: error.status_code().as_u16(),
            message: error.to_string(),
            outcome: "error",
            delivery_id,
            timestamp: Utc::now(),
            pipelines: None,
            planned: None,
        }
    }
}

impl IntoResponse for WebhookResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
