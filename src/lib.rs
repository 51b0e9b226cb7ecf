pub mod api;
pub mod branch;
pub mod changeset;
pub mod codepipeline;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod github;
pub mod logging;
pub mod naming;
pub mod outcome;
pub mod processor;
pub mod signature;
pub mod subfolder;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

use changeset::CommitSource;
use config::ConfigSource;
use dispatch::PipelineControl;

pub struct AppState {
    /// Read again on every delivery.
    pub config_source: ConfigSource,
    pub commits: Arc<dyn CommitSource>,
    pub pipelines: Arc<dyn PipelineControl>,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config_source: ConfigSource,
        commits: Arc<dyn CommitSource>,
        pipelines: Arc<dyn PipelineControl>,
    ) -> Self {
        Self {
            config_source,
            commits,
            pipelines,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;
