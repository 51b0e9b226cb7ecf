//! Banner and status endpoints

use axum::{Json, extract::State as AxumState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::SharedState;

const SERVER_NAME: &str = "monorepo_webhook";

pub async fn root() -> &'static str {
    "GitHub monorepo webhook for CodePipeline"
}

#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub name: &'static str,
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub config: ConfigStatus,
}

#[derive(Debug, Serialize)]
pub struct ConfigStatus {
    pub source: String,
    /// False when the configuration currently fails to load.
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_model: Option<&'static str>,
    pub offline: bool,
}

/// GET /status - server uptime and the configuration deliveries will see
pub async fn status(AxumState(state): AxumState<SharedState>) -> Json<ServerStatus> {
    let config = match state.config_source.load().await {
        Ok(config) => ConfigStatus {
            source: state.config_source.describe(),
            loaded: true,
            service_model: config.service_model.map(|m| m.as_str()),
            offline: config.offline,
        },
        Err(e) => {
            warn!("Configuration failed to load: {}", e);
            ConfigStatus {
                source: state.config_source.describe(),
                loaded: false,
                service_model: None,
                offline: false,
            }
        }
    };

    Json(ServerStatus {
        name: SERVER_NAME,
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        config,
    })
}
