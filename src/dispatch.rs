//! Starting pipelines, with the pull-request retargeting pre-pass.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, WebhookError};
use crate::naming::PipelineName;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Could not find CodePipeline {0}.")]
    PipelineNotFound(String),

    #[error("Pipeline control failed: {0}")]
    Upstream(String),
}

/// Operations of the pipeline-control service, keyed by pipeline name.
#[async_trait]
pub trait PipelineControl: Send + Sync {
    /// Points the `Source` action of the pipeline's first stage at `branch`.
    async fn retarget_source_branch(
        &self,
        pipeline: &PipelineName,
        branch: &str,
    ) -> std::result::Result<(), ControlError>;

    /// Starts one execution; returns the execution id when the service reports one.
    async fn start_execution(
        &self,
        pipeline: &PipelineName,
    ) -> std::result::Result<Option<String>, ControlError>;
}

/// Partition of the requested pipelines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub started: Vec<PipelineName>,
    pub not_found: Vec<PipelineName>,
    /// Pull requests only: pipelines whose source branch could not be set.
    pub not_retargeted: Vec<PipelineName>,
}

impl DispatchResult {
    pub fn is_complete(&self) -> bool {
        self.not_found.is_empty() && self.not_retargeted.is_empty()
    }
}

/// Retargets every pipeline to `branch`. Returns the pipelines that were
/// updated and those that do not exist; any other failure aborts.
pub async fn retarget_pipelines(
    control: &dyn PipelineControl,
    pipelines: Vec<PipelineName>,
    branch: &str,
) -> Result<(Vec<PipelineName>, Vec<PipelineName>)> {
    let mut updated = Vec::with_capacity(pipelines.len());
    let mut missing = Vec::new();

    for pipeline in pipelines {
        match control.retarget_source_branch(&pipeline, branch).await {
            Ok(()) => {
                info!("Set source branch of CodePipeline {} to {}.", pipeline, branch);
                updated.push(pipeline);
            }
            Err(ControlError::PipelineNotFound(_)) => {
                warn!("Could not modify CodePipeline {}.", pipeline);
                missing.push(pipeline);
            }
            Err(ControlError::Upstream(msg)) => return Err(WebhookError::Upstream(msg)),
        }
    }

    Ok((updated, missing))
}

/// Starts every pipeline in order. Missing pipelines are collected, any other
/// failure aborts.
pub async fn start_pipelines(
    control: &dyn PipelineControl,
    pipelines: Vec<PipelineName>,
) -> Result<(Vec<PipelineName>, Vec<PipelineName>)> {
    let mut started = Vec::with_capacity(pipelines.len());
    let mut not_found = Vec::new();

    for pipeline in pipelines {
        match control.start_execution(&pipeline).await {
            Ok(execution_id) => {
                info!(
                    "Started CodePipeline {} (execution {}).",
                    pipeline,
                    execution_id.as_deref().unwrap_or("unknown")
                );
                started.push(pipeline);
            }
            Err(ControlError::PipelineNotFound(_)) => {
                info!("Could not find CodePipeline {}.", pipeline);
                not_found.push(pipeline);
            }
            Err(ControlError::Upstream(msg)) => return Err(WebhookError::Upstream(msg)),
        }
    }

    Ok((started, not_found))
}

/// Runs the dispatch for one delivery. `retarget_branch` is the pull request's
/// head branch, `None` for pushes.
pub async fn dispatch(
    control: &dyn PipelineControl,
    pipelines: Vec<PipelineName>,
    retarget_branch: Option<&str>,
) -> Result<DispatchResult> {
    let (pipelines, not_retargeted) = match retarget_branch {
        Some(branch) => retarget_pipelines(control, pipelines, branch).await?,
        None => (pipelines, Vec::new()),
    };

    let (started, not_found) = start_pipelines(control, pipelines).await?;

    Ok(DispatchResult {
        started,
        not_found,
        not_retargeted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeControl {
        existing: HashSet<String>,
        broken: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeControl {
        fn with(existing: &[&str]) -> Self {
            Self {
                existing: existing.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn lookup(&self, name: &PipelineName) -> std::result::Result<(), ControlError> {
            if self.broken.contains(name.as_str()) {
                return Err(ControlError::Upstream("AccessDenied".into()));
            }
            if !self.existing.contains(name.as_str()) {
                return Err(ControlError::PipelineNotFound(name.to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PipelineControl for FakeControl {
        async fn retarget_source_branch(
            &self,
            pipeline: &PipelineName,
            branch: &str,
        ) -> std::result::Result<(), ControlError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("retarget {} {}", pipeline, branch));
            self.lookup(pipeline)
        }

        async fn start_execution(
            &self,
            pipeline: &PipelineName,
        ) -> std::result::Result<Option<String>, ControlError> {
            self.calls.lock().unwrap().push(format!("start {}", pipeline));
            self.lookup(pipeline).map(|_| Some(format!("exec-{}", pipeline)))
        }
    }

    fn names(items: &[&str]) -> Vec<PipelineName> {
        items.iter().map(|s| PipelineName::new(*s).unwrap()).collect()
    }

    #[tokio::test]
    async fn all_started() {
        let control = FakeControl::with(&["a", "b"]);
        let result = dispatch(&control, names(&["a", "b"]), None).await.unwrap();
        assert_eq!(result.started, names(&["a", "b"]));
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn missing_pipeline_is_partitioned() {
        let control = FakeControl::with(&["a", "c"]);
        let result = dispatch(&control, names(&["a", "b", "c"]), None).await.unwrap();
        assert_eq!(result.started, names(&["a", "c"]));
        assert_eq!(result.not_found, names(&["b"]));
        assert!(!result.started.contains(&PipelineName::new("b").unwrap()));
        assert!(!result.is_complete());
    }

    #[tokio::test]
    async fn pull_request_retargets_before_start() {
        let control = FakeControl::with(&["a"]);
        let result = dispatch(&control, names(&["a", "b"]), Some("feature/x"))
            .await
            .unwrap();

        assert_eq!(result.started, names(&["a"]));
        assert_eq!(result.not_retargeted, names(&["b"]));
        assert!(result.not_found.is_empty());
        assert_eq!(
            *control.calls.lock().unwrap(),
            vec!["retarget a feature/x", "retarget b feature/x", "start a"]
        );
    }

    #[tokio::test]
    async fn retarget_upstream_failure_aborts_before_any_start() {
        let mut control = FakeControl::with(&["a", "b"]);
        control.broken.insert("b".into());
        let err = dispatch(&control, names(&["a", "b"]), Some("feature/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Upstream(msg) if msg == "AccessDenied"));
        assert_eq!(
            *control.calls.lock().unwrap(),
            vec!["retarget a feature/x", "retarget b feature/x"]
        );
    }

    #[tokio::test]
    async fn upstream_failure_aborts() {
        let mut control = FakeControl::with(&["a", "b"]);
        control.broken.insert("a".into());
        let err = dispatch(&control, names(&["a", "b"]), None).await.unwrap_err();
        assert!(matches!(err, WebhookError::Upstream(_)));
        assert_eq!(*control.calls.lock().unwrap(), vec!["start a"]);
    }
}
