//! Processing of one webhook delivery, from the raw request to an [`Outcome`].
//!
//! Stages run strictly in order: signature check, classification, branch
//! routing, change set, subfolders, pipeline names, dispatch. The business
//! conditions raised along the way end the delivery as `Outcome::NoAction`.

use axum::http::HeaderMap;
use tracing::{info, warn};

use crate::changeset::{self, CommitSource};
use crate::config::WebhookConfig;
use crate::dispatch::{self, PipelineControl};
use crate::error::{Result, WebhookError};
use crate::event::{self, EventKind, WebhookEvent};
use crate::naming::{PipelineName, build_pipeline_names};
use crate::outcome::Outcome;
use crate::signature;
use crate::subfolder::{SubfolderSet, resolve_subfolders};

/// Raw request as received.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
    /// Derive pipelines without calling the pipeline-control service.
    pub dry_run: bool,
}

/// Pipelines derived for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    pub kind: EventKind,
    pub repository: String,
    pub subfolders: SubfolderSet,
    pub pipelines: Vec<PipelineName>,
    /// Pull requests: head branch the pipelines are pointed at before starting.
    pub retarget_branch: Option<String>,
}

/// Derives the pipelines an event should start.
pub async fn plan_pipelines(
    event: &WebhookEvent,
    config: &WebhookConfig,
    commits: &dyn CommitSource,
) -> Result<PipelinePlan> {
    let (Some(branch_ref), Some(repository)) = (event.branch_ref(), event.repository_name())
    else {
        return Err(WebhookError::UnsupportedEvent(event.kind().to_string()));
    };
    info!("Pushed branch: {}", branch_ref);

    let branch_route = config.branches.route(&branch_ref)?;

    let changes = match event {
        WebhookEvent::Push(push) => changeset::from_push(push)?,
        WebhookEvent::PullRequest(pr) => {
            changeset::from_pull_request(pr, commits, config.github_access_token.as_deref())
                .await?
        }
        WebhookEvent::Ping => return Err(WebhookError::UnsupportedEvent("ping".to_string())),
    };
    info!("{} file(s) touched", changes.paths().len());

    let subfolders = resolve_subfolders(changes.paths(), config.service_model)?;

    let routing = config.routing_for(event.kind(), &branch_route);
    let pipelines =
        build_pipeline_names(&subfolders, repository, &config.naming_options(), &routing)?;

    let retarget_branch = match event {
        WebhookEvent::PullRequest(pr) => Some(pr.pull_request.head.name.clone()),
        _ => None,
    };

    Ok(PipelinePlan {
        kind: event.kind(),
        repository: repository.to_string(),
        subfolders,
        pipelines,
        retarget_branch,
    })
}

async fn run(
    delivery: &Delivery<'_>,
    config: &WebhookConfig,
    commits: &dyn CommitSource,
    control: &dyn PipelineControl,
) -> Result<Outcome> {
    let event = event::classify(delivery.headers, delivery.body)?;
    if let WebhookEvent::Ping = event {
        return Ok(Outcome::Acknowledged);
    }

    let plan = plan_pipelines(&event, config, commits).await?;

    if delivery.dry_run || config.offline {
        info!("Offline; not starting CodePipelines {:?}", plan.pipelines);
        return Ok(Outcome::Offline(plan.pipelines));
    }

    info!("---- STARTING RESPECTIVE CODEPIPELINES ----");
    let result = dispatch::dispatch(control, plan.pipelines, plan.retarget_branch.as_deref()).await?;
    Ok(Outcome::Dispatched(result))
}

/// Authenticates and processes one delivery.
///
/// Authentication failures, malformed requests and upstream failures are
/// returned as errors. Business conditions become `Outcome::NoAction`.
pub async fn process_delivery(
    delivery: &Delivery<'_>,
    config: &WebhookConfig,
    commits: &dyn CommitSource,
    control: &dyn PipelineControl,
) -> Result<Outcome> {
    signature::authenticate(delivery.headers, delivery.body, &config.webhook_secret)?;

    match run(delivery, config, commits, control).await {
        Err(e) if e.is_no_action() => {
            warn!("{}", e);
            Ok(Outcome::no_action(&e))
        }
        other => other,
    }
}
