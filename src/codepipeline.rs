//! [`PipelineControl`] backed by AWS CodePipeline.

use async_trait::async_trait;
use aws_sdk_codepipeline::Client;
use aws_sdk_codepipeline::error::DisplayErrorContext;
use aws_sdk_codepipeline::types::PipelineDeclaration;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::dispatch::{ControlError, PipelineControl};
use crate::naming::PipelineName;

const SOURCE_ACTION: &str = "Source";
const BRANCH_KEY: &str = "Branch";

#[derive(Debug, Clone)]
pub struct CodePipelineControl {
    client: Client,
}

impl CodePipelineControl {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the default AWS credential and region chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }
}

fn upstream<E>(e: E) -> ControlError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ControlError::Upstream(DisplayErrorContext(e).to_string())
}

/// Sets `Branch` on every `Source` action of the first stage. Returns false if
/// the pipeline has no such action.
pub fn set_source_branch(pipeline: &mut PipelineDeclaration, branch: &str) -> bool {
    let Some(stage) = pipeline.stages.first_mut() else {
        return false;
    };

    let mut changed = false;
    for action in stage.actions.iter_mut().filter(|a| a.name == SOURCE_ACTION) {
        action
            .configuration
            .get_or_insert_with(HashMap::new)
            .insert(BRANCH_KEY.to_string(), branch.to_string());
        changed = true;
    }
    changed
}

#[async_trait]
impl PipelineControl for CodePipelineControl {
    async fn retarget_source_branch(
        &self,
        pipeline: &PipelineName,
        branch: &str,
    ) -> Result<(), ControlError> {
        let output = self
            .client
            .get_pipeline()
            .name(pipeline.as_str())
            .send()
            .await
            .map_err(|e| {
                let e = e.into_service_error();
                if e.is_pipeline_not_found_exception() {
                    ControlError::PipelineNotFound(pipeline.to_string())
                } else {
                    upstream(e)
                }
            })?;

        let Some(mut declaration) = output.pipeline else {
            return Err(ControlError::PipelineNotFound(pipeline.to_string()));
        };

        if !set_source_branch(&mut declaration, branch) {
            warn!(
                "CodePipeline {} has no {} action in its first stage; leaving it unchanged",
                pipeline, SOURCE_ACTION
            );
            return Ok(());
        }

        self.client
            .update_pipeline()
            .pipeline(declaration)
            .send()
            .await
            .map_err(|e| upstream(e.into_service_error()))?;
        debug!("Updated CodePipeline {}", pipeline);
        Ok(())
    }

    async fn start_execution(&self, pipeline: &PipelineName) -> Result<Option<String>, ControlError> {
        let output = self
            .client
            .start_pipeline_execution()
            .name(pipeline.as_str())
            .send()
            .await
            .map_err(|e| {
                let e = e.into_service_error();
                if e.is_pipeline_not_found_exception() {
                    ControlError::PipelineNotFound(pipeline.to_string())
                } else {
                    upstream(e)
                }
            })?;

        Ok(output.pipeline_execution_id().map(str::to_string))
    }
}
