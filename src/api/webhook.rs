//! Webhook handler for GitHub deliveries

use axum::{
    body::Bytes,
    extract::{Query, State as AxumState},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::SharedState;
use crate::event::{DELIVERY_HEADER, EVENT_HEADER, header_str};
use crate::outcome::WebhookResponse;
use crate::processor::{Delivery, process_delivery};

pub const DRY_RUN_HEADER: &str = "X-Dry-Run";

fn is_dry_run(params: &HashMap<String, String>, headers: &HeaderMap) -> bool {
    params.get("dry_run").map(|v| v == "true").unwrap_or(false)
        || headers.get(DRY_RUN_HEADER).is_some()
}

/// Handles the GitHub webhook POST request.
///
/// The raw body is kept as bytes so the signature is checked over exactly
/// what GitHub signed.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery_id = header_str(&headers, DELIVERY_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::now_v7().to_string());
    let event = header_str(&headers, EVENT_HEADER).unwrap_or("unknown").to_string();
    let dry_run = is_dry_run(&params, &headers);

    let span = info_span!("delivery", delivery_id = %delivery_id, event = %event);

    async move {
        info!("Received {} delivery ({} bytes)", event, body.len());

        let config = match state.config_source.load().await {
            Ok(config) => config,
            Err(e) => {
                error!("Could not load configuration: {}", e);
                return WebhookResponse::from_error(&e, Some(delivery_id)).into_response();
            }
        };

        let delivery = Delivery {
            headers: &headers,
            body: &body,
            dry_run,
        };

        match process_delivery(
            &delivery,
            &config,
            state.commits.as_ref(),
            state.pipelines.as_ref(),
        )
        .await
        {
            Ok(outcome) => {
                info!("{}", outcome.message());
                WebhookResponse::from_outcome(outcome, Some(delivery_id)).into_response()
            }
            Err(e) if e.is_unauthenticated() => {
                warn!("Rejected delivery: {}", e);
                WebhookResponse::from_error(&e, Some(delivery_id)).into_response()
            }
            Err(e) => {
                error!("Delivery failed: {}", e);
                WebhookResponse::from_error(&e, Some(delivery_id)).into_response()
            }
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn dry_run_from_query_or_header() {
        let mut params = HashMap::new();
        let mut headers = HeaderMap::new();
        assert!(!is_dry_run(&params, &headers));

        params.insert("dry_run".to_string(), "true".to_string());
        assert!(is_dry_run(&params, &headers));

        params.insert("dry_run".to_string(), "no".to_string());
        assert!(!is_dry_run(&params, &headers));

        headers.insert(DRY_RUN_HEADER, HeaderValue::from_static("1"));
        assert!(is_dry_run(&params, &headers));
    }
}
