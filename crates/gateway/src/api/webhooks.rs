//! Inbound webhook surface.
//!
//! - `POST /webhooks/calendar` — push notification, headers only.
//! - `POST /webhooks/transcript/:provider` — provider payload; acknowledged
//!   immediately, processed on a detached task.
//! - `POST /webhooks/payment` — payment event, bearer-authenticated against
//!   the tenant's webhook secret.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::Value;

use cs_domain::error::Error;
use cs_engine::payments::PaymentEvent;

use crate::api::auth::secrets_match;
use crate::state::AppState;

/// Bound on the detached transcript continuation; providers have already
/// been acknowledged by the time this runs.
const TRANSCRIPT_DEADLINE_SECS: u64 = 180;

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /webhooks/calendar
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Calendar push notification. The channel token carries the tenant id;
/// the body is empty. `sync` states acknowledge without processing.
pub async fn calendar_push(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let resource_state = header(&headers, "x-goog-resource-state");
    if resource_state == "sync" {
        return StatusCode::OK.into_response();
    }

    let tenant_id = header(&headers, "x-goog-channel-token").to_string();
    if tenant_id.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "missing channel token");
    }

    match state.calendar_sync.handle_notification(&tenant_id).await {
        Ok(summary) => Json(serde_json::json!({
            "status": "ok",
            "fetched": summary.fetched,
            "created": summary.created,
            "updated": summary.updated,
            "canceled": summary.canceled,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(tenant = %tenant_id, error = %e, "calendar notification failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "notification processing failed")
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /webhooks/transcript/:provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Transcript webhook. Providers retry on non-200, so the acknowledgement
/// must precede any non-trivial work: respond immediately and continue on a
/// detached task with its own deadline.
pub async fn transcript_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(payload): Json<Value>,
) -> Response {
    tokio::spawn(async move {
        let work = state.transcript_ingest.ingest(&provider, &payload, None);
        match tokio::time::timeout(
            std::time::Duration::from_secs(TRANSCRIPT_DEADLINE_SECS),
            work,
        )
        .await
        {
            Ok(Ok(outcome)) => {
                tracing::info!(provider = %provider, outcome = ?outcome, "transcript processed");
            }
            Ok(Err(e)) => {
                tracing::error!(provider = %provider, error = %e, "transcript processing failed");
            }
            Err(_) => {
                tracing::error!(
                    provider = %provider,
                    deadline_secs = TRANSCRIPT_DEADLINE_SECS,
                    "transcript processing deadline exceeded"
                );
            }
        }
    });
    Json(serde_json::json!({ "status": "received" })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /webhooks/payment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct PaymentWebhookBody {
    pub tenant_id: String,
    #[serde(flatten)]
    pub event: PaymentEvent,
}

/// Payment webhook, authenticated with the tenant's stored webhook secret
/// as a bearer token.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PaymentWebhookBody>,
) -> Response {
    let tenant = match state.warehouse.get_tenant(&body.tenant_id).await {
        Ok(Some(t)) => t,
        Ok(None) => return api_error(StatusCode::UNAUTHORIZED, "unknown tenant"),
        Err(e) => {
            tracing::error!(error = %e, "tenant lookup failed");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "tenant lookup failed");
        }
    };

    let bearer = header(&headers, "authorization")
        .strip_prefix("Bearer ")
        .unwrap_or("");
    if !secrets_match(bearer, &tenant.webhook_secret) {
        return api_error(StatusCode::UNAUTHORIZED, "invalid webhook secret");
    }

    match state.payments.process(&tenant.id, &body.event).await {
        Ok(action) => Json(serde_json::json!({ "action": action })).into_response(),
        Err(Error::Validation(message)) => api_error(StatusCode::BAD_REQUEST, message),
        Err(e) => {
            tracing::error!(tenant = %tenant.id, error = %e, "payment processing failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "payment processing failed")
        }
    }
}
