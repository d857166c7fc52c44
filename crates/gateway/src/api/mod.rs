pub mod admin;
pub mod auth;
pub mod webhooks;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (webhooks authenticate themselves:
/// channel token, per-tenant secret, provider payload) and **admin** (gated
/// behind the admin bearer-token middleware).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        // Health probe (public, no auth)
        .route("/health", get(admin::health))
        // Inbound webhooks
        .route("/webhooks/calendar", post(webhooks::calendar_push))
        .route(
            "/webhooks/transcript/:provider",
            post(webhooks::transcript_webhook),
        )
        .route("/webhooks/payment", post(webhooks::payment_webhook));

    let admin_routes = Router::new()
        .route("/admin/tenants", post(admin::create_tenant))
        .route("/admin/tenants/:id/closers", post(admin::create_closer))
        .route(
            "/admin/tenants/:id/closers/:closer_id",
            delete(admin::deactivate_closer),
        )
        .layer(middleware::from_fn_with_state(
            state,
            auth::require_admin_token,
        ));

    public.merge(admin_routes)
}
