//! AppState construction and background-task spawning extracted from
//! `main.rs`.

use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};

use cs_domain::config::{Config, ConfigSeverity};
use cs_engine::ai::AiPipeline;
use cs_engine::alerts::WebhookAlertSink;
use cs_engine::audit::AuditWriter;
use cs_engine::calendar_sync::CalendarSync;
use cs_engine::lifecycle::Lifecycle;
use cs_engine::payments::PaymentProcessor;
use cs_engine::push_channels::{PushChannelManager, PushChannelRegistry};
use cs_engine::state_machine::StateMachine;
use cs_engine::sweeper::Sweeper;
use cs_engine::transcript_ingest::TranscriptIngest;
use cs_providers::calendar::google::{EnvCalendarAuth, GoogleCalendarClient};
use cs_providers::calendar::{CalendarAdapterRegistry, CalendarApi};
use cs_providers::llm::anthropic::AnthropicProvider;
use cs_providers::transcript::TranscriptRegistry;
use cs_warehouse::{MemoryWarehouse, Warehouse};

use crate::state::AppState;

/// Env var holding the delegated calendar access token.
const CALENDAR_TOKEN_ENV: &str = "CS_CALENDAR_TOKEN";

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Warehouse ────────────────────────────────────────────────────
    let warehouse: Arc<dyn Warehouse> = Arc::new(MemoryWarehouse::new());
    tracing::info!("warehouse gateway ready (in-memory backend)");

    // ── Audit + alerts ───────────────────────────────────────────────
    let audit = Arc::new(AuditWriter::new(warehouse.clone()));
    let alerts = Arc::new(WebhookAlertSink::new(config.alerts.webhook_url.clone()));
    tracing::info!(
        webhook = config.alerts.webhook_url.is_some(),
        "alert sink ready"
    );

    // ── State machine ────────────────────────────────────────────────
    let machine = Arc::new(StateMachine::new(warehouse.clone(), audit.clone()));
    tracing::info!("state machine ready");

    // ── Calendar providers ───────────────────────────────────────────
    let calendar_adapters = Arc::new(CalendarAdapterRegistry::with_builtins());
    let calendar_api: Arc<dyn CalendarApi> = Arc::new(
        GoogleCalendarClient::new(Box::new(EnvCalendarAuth {
            env_var: CALENDAR_TOKEN_ENV.to_string(),
        }))
        .context("initializing Google Calendar client")?,
    );
    tracing::info!("calendar providers ready");

    // ── Transcript providers ─────────────────────────────────────────
    let transcripts = Arc::new(TranscriptRegistry::with_builtins());
    tracing::info!("transcript providers ready");

    // ── LLM + AI pipeline ────────────────────────────────────────────
    let llm = Arc::new(
        AnthropicProvider::from_config(&config.llm).context("initializing LLM provider")?,
    );
    let ai = Arc::new(AiPipeline::new(
        llm,
        warehouse.clone(),
        machine.clone(),
        audit.clone(),
        config.llm.clone(),
    ));
    tracing::info!(model = %config.llm.model, "AI pipeline ready");

    // ── Orchestrators ────────────────────────────────────────────────
    let transcript_ingest = Arc::new(TranscriptIngest::new(
        warehouse.clone(),
        machine.clone(),
        transcripts.clone(),
        ai,
        audit.clone(),
        alerts.clone(),
    ));
    let calendar_sync = Arc::new(CalendarSync::new(
        warehouse.clone(),
        machine.clone(),
        calendar_adapters,
        calendar_api.clone(),
        alerts.clone(),
        config.calendar.clone(),
    ));
    tracing::info!("ingest orchestrators ready");

    // ── Payments ─────────────────────────────────────────────────────
    let payments = Arc::new(PaymentProcessor::new(
        warehouse.clone(),
        machine.clone(),
        audit.clone(),
        alerts.clone(),
    ));
    tracing::info!("payment reconciliation ready");

    // ── Push channels ────────────────────────────────────────────────
    let push_channels = Arc::new(PushChannelManager::new(
        Arc::new(PushChannelRegistry::new()),
        calendar_api,
        warehouse.clone(),
        format!(
            "{}/webhooks/calendar",
            config.server.public_base_url.trim_end_matches('/')
        ),
        config.push.clone(),
    ));
    tracing::info!("push channel manager ready");

    // ── Tenant & closer lifecycle ────────────────────────────────────
    let lifecycle = Arc::new(Lifecycle::new(
        warehouse.clone(),
        transcripts.clone(),
        push_channels.clone(),
        audit,
        config.server.public_base_url.clone(),
    ));
    tracing::info!("tenant lifecycle ready");

    // ── Sweeper ──────────────────────────────────────────────────────
    let sweeper = Arc::new(Sweeper::new(
        warehouse.clone(),
        machine,
        transcript_ingest.clone(),
        transcripts,
        config.sweeper.clone(),
    ));
    tracing::info!(
        interval_secs = config.sweeper.interval_secs,
        ghost_timeout_minutes = config.sweeper.ghost_timeout_minutes,
        "sweeper ready"
    );

    // ── Admin token (read once at startup) ───────────────────────────
    let admin_token_hash = match std::env::var(&config.server.admin_token_env) {
        Ok(token) if !token.is_empty() => Some(Sha256::digest(token.as_bytes()).to_vec()),
        _ => {
            tracing::warn!(
                env = %config.server.admin_token_env,
                "admin token unset; admin endpoints are unauthenticated (dev mode)"
            );
            None
        }
    };

    Ok(AppState {
        config,
        warehouse,
        calendar_sync,
        transcript_ingest,
        payments,
        sweeper,
        push_channels,
        lifecycle,
        admin_token_hash,
    })
}

/// Spawn the periodic jobs: the three-phase sweeper (which also evicts the
/// calendar recency filter) and push-channel renewal. Each tick completes
/// before the next begins.
pub fn spawn_background_loops(state: &AppState) {
    let sweeper = state.sweeper.clone();
    let calendar_sync = state.calendar_sync.clone();
    let interval_secs = state.config.sweeper.interval_secs;
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweeper.tick().await;
            calendar_sync.evict_recency_filter();
        }
    });
    tracing::info!(interval_secs, "sweeper loop started");

    let push = state.push_channels.clone();
    let renewal_secs = state.config.push.renewal_interval_secs;
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(renewal_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            push.renew_expiring().await;
        }
    });
    tracing::info!(renewal_secs, "push renewal loop started");
}
