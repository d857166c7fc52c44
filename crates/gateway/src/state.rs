use std::sync::Arc;

use cs_domain::config::Config;
use cs_engine::calendar_sync::CalendarSync;
use cs_engine::lifecycle::Lifecycle;
use cs_engine::payments::PaymentProcessor;
use cs_engine::push_channels::PushChannelManager;
use cs_engine::sweeper::Sweeper;
use cs_engine::transcript_ingest::TranscriptIngest;
use cs_warehouse::Warehouse;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core** — config and the warehouse gateway
/// - **Ingest** — calendar and transcript orchestrators
/// - **Operations** — payments, sweeper, push channels, provisioning
/// - **Security** — the startup-computed admin token hash
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub warehouse: Arc<dyn Warehouse>,

    // ── Ingest ────────────────────────────────────────────────────────
    pub calendar_sync: Arc<CalendarSync>,
    pub transcript_ingest: Arc<TranscriptIngest>,

    // ── Operations ────────────────────────────────────────────────────
    pub payments: Arc<PaymentProcessor>,
    pub sweeper: Arc<Sweeper>,
    pub push_channels: Arc<PushChannelManager>,
    pub lifecycle: Arc<Lifecycle>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the admin bearer token (read once at startup).
    /// `None` = dev mode (admin endpoints accessible without auth).
    pub admin_token_hash: Option<Vec<u8>>,
}
