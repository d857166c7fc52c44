//! Admin endpoints: health probe and tenant/closer provisioning.
//!
//! - `GET  /health` — warehouse probe (public)
//! - `POST /admin/tenants`
//! - `POST /admin/tenants/:id/closers`
//! - `DELETE /admin/tenants/:id/closers/:closer_id`

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use cs_domain::error::Error;
use cs_engine::lifecycle::{NewCloser, NewTenant};

use crate::state::AppState;

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

fn from_engine_error(e: Error) -> Response {
    match e {
        Error::Validation(message) => api_error(StatusCode::BAD_REQUEST, message),
        Error::NotFound(message) => api_error(StatusCode::NOT_FOUND, message),
        other => {
            tracing::error!(error = %other, "admin operation failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "operation failed")
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /health
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let warehouse_ok = state.warehouse.ping().await;
    let status = if warehouse_ok { "ok" } else { "degraded" };
    let code = if warehouse_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(serde_json::json!({
            "status": status,
            "warehouse": warehouse_ok,
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /admin/tenants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct CreateTenantRequest {
    pub display_name: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub filter_phrases: Option<Vec<String>>,
}

pub async fn create_tenant(
    State(state): State<AppState>,
    Json(req): Json<CreateTenantRequest>,
) -> Response {
    let provisioned = match state
        .lifecycle
        .create_tenant(NewTenant {
            display_name: req.display_name,
            timezone: req.timezone,
            filter_phrases: req.filter_phrases,
        })
        .await
    {
        Ok(p) => p,
        Err(e) => return from_engine_error(e),
    };
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "tenant_id": provisioned.tenant.id,
            "webhook_secret": provisioned.tenant.webhook_secret,
            "transcript_webhook_url": provisioned.transcript_webhook_url,
            "payment_webhook_url": provisioned.payment_webhook_url,
            "setup_instructions": provisioned.setup_instructions,
        })),
    )
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /admin/tenants/:id/closers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
pub struct CreateCloserRequest {
    pub display_name: String,
    pub work_email: String,
    #[serde(default)]
    pub transcript_provider: Option<String>,
    #[serde(default)]
    pub transcript_credential: Option<String>,
}

pub async fn create_closer(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(req): Json<CreateCloserRequest>,
) -> Response {
    let provisioned = match state
        .lifecycle
        .create_closer(
            &tenant_id,
            NewCloser {
                display_name: req.display_name,
                work_email: req.work_email,
                transcript_provider: req.transcript_provider,
                transcript_credential: req.transcript_credential,
            },
        )
        .await
    {
        Ok(p) => p,
        Err(e) => return from_engine_error(e),
    };
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "closer_id": provisioned.closer.id,
            "work_email": provisioned.closer.work_email,
            "provider_webhook_registered": provisioned.provider_webhook_registered,
        })),
    )
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /admin/tenants/:id/closers/:closer_id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn deactivate_closer(
    State(state): State<AppState>,
    Path((tenant_id, closer_id)): Path<(String, String)>,
) -> Response {
    match state.lifecycle.deactivate_closer(&tenant_id, &closer_id).await {
        Ok(closer) => Json(serde_json::json!({
            "closer_id": closer.id,
            "status": "inactive",
        }))
        .into_response(),
        Err(e) => from_engine_error(e),
    }
}
