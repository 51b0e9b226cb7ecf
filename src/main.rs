use monorepo_webhook::api;
use monorepo_webhook::codepipeline::CodePipelineControl;
use monorepo_webhook::config::ConfigSource;
use monorepo_webhook::github::GitHubCommitClient;
use monorepo_webhook::logging::{LogSettings, setup_logging};
use monorepo_webhook::AppState;
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let _log_guard = setup_logging(&LogSettings::from_env());

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());

    // Configuration is read again per delivery; this load only fails fast.
    let config_source = ConfigSource::detect();
    match config_source.load().await {
        Ok(config) => {
            if config.offline {
                warn!("OFFLINE is set; no CodePipeline will be started");
            }
        }
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }

    let commits = match GitHubCommitClient::with_defaults() {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let pipelines = CodePipelineControl::from_env().await;

    let state = Arc::new(AppState::new(
        config_source,
        Arc::new(commits),
        Arc::new(pipelines),
    ));
    info!("Using config from {}", state.config_source.describe());

    let app = api::router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Could not bind {}: {}", bind_address, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", bind_address);

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
