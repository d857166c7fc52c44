//! Calendar orchestrator.
//!
//! A push notification carries headers only; the orchestrator fetches the
//! changed events for every active closer of the tenant, dedupes them, and
//! hands each through the single-event pipeline: recency filter,
//! cancellation bypass, tenant filter phrases, closer resolution, state
//! machine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use cs_domain::config::CalendarConfig;
use cs_domain::error::Result;
use cs_domain::event::CanonicalCalendarEvent;
use cs_domain::tenant::{Closer, Tenant};
use cs_providers::calendar::{CalendarAdapterRegistry, CalendarApi};
use cs_warehouse::Warehouse;

use crate::alerts::{Alert, AlertSeverity, AlertSink};
use crate::state_machine::{DispatchOutcome, StateMachine};

/// The calendar provider every closer calendar currently lives on.
const CALENDAR_PROVIDER: &str = "google";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recency filter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Best-effort duplicate-push suppression. Per-instance, lossy, never
/// authoritative; the state machine's validity check is the backstop for
/// anything that slips through.
pub struct RecencyFilter {
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl RecencyFilter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    fn fingerprint(event: &CanonicalCalendarEvent) -> String {
        let mut attendees: Vec<&str> =
            event.attendees.iter().map(|a| a.email.as_str()).collect();
        attendees.sort_unstable();
        format!(
            "{}|{}|{}|{}|{}",
            event.event_id,
            event.organizer_email,
            attendees.join(","),
            event.status,
            event.start
        )
    }

    /// `true` when this event has not been seen within the window. Only a
    /// passing event is marked, so a suppressed duplicate does not extend
    /// the window.
    pub fn check_and_mark(&self, event: &CanonicalCalendarEvent) -> bool {
        let key = Self::fingerprint(event);
        let now = Instant::now();
        let mut seen = self.seen.lock();
        let fresh = match seen.get(&key) {
            Some(at) => now.duration_since(*at) >= self.window,
            None => true,
        };
        if fresh {
            seen.insert(key, now);
        }
        fresh
    }

    /// Drop entries older than the window. Piggy-backed on sweep ticks.
    pub fn evict(&self) {
        let now = Instant::now();
        self.seen
            .lock()
            .retain(|_, at| now.duration_since(*at) < self.window);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.lock().len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default)]
pub struct SyncSummary {
    pub fetched: usize,
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub canceled: usize,
    pub skipped: usize,
}

pub struct CalendarSync {
    warehouse: Arc<dyn Warehouse>,
    machine: Arc<StateMachine>,
    adapters: Arc<CalendarAdapterRegistry>,
    api: Arc<dyn CalendarApi>,
    alerts: Arc<dyn AlertSink>,
    recency: RecencyFilter,
    config: CalendarConfig,
}

impl CalendarSync {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        machine: Arc<StateMachine>,
        adapters: Arc<CalendarAdapterRegistry>,
        api: Arc<dyn CalendarApi>,
        alerts: Arc<dyn AlertSink>,
        config: CalendarConfig,
    ) -> Self {
        let recency = RecencyFilter::new(Duration::from_secs(config.recency_window_secs));
        Self {
            warehouse,
            machine,
            adapters,
            api,
            alerts,
            recency,
            config,
        }
    }

    /// Entry point for one push notification.
    pub async fn handle_notification(&self, tenant_id: &str) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        let Some(tenant) = self.warehouse.get_tenant(tenant_id).await? else {
            tracing::warn!(tenant = %tenant_id, "notification for unknown tenant, discarded");
            return Ok(summary);
        };

        let closers = self.warehouse.list_active_closers(&tenant.id).await?;
        let since = Utc::now() - chrono::Duration::minutes(self.config.delta_window_minutes);
        let events = self.fetch_and_dedupe(&tenant, &closers, since).await;
        summary.fetched = events.len();

        for event in events {
            summary.processed += 1;
            match self.process_event(&tenant, &event).await {
                Ok(DispatchOutcome::Created(_)) => summary.created += 1,
                Ok(DispatchOutcome::Updated(_)) => summary.updated += 1,
                Ok(DispatchOutcome::Canceled(_)) => summary.canceled += 1,
                Ok(DispatchOutcome::Skipped(_)) | Ok(DispatchOutcome::Dropped) => {
                    summary.skipped += 1
                }
                Err(e) => {
                    summary.skipped += 1;
                    tracing::error!(
                        tenant = %tenant.id,
                        event = %event.event_id,
                        error = %e,
                        "calendar event processing failed"
                    );
                }
            }
        }
        tracing::info!(
            tenant = %tenant.id,
            fetched = summary.fetched,
            created = summary.created,
            updated = summary.updated,
            canceled = summary.canceled,
            "calendar notification processed"
        );
        Ok(summary)
    }

    /// Evict expired recency-filter entries. Called from the sweep tick.
    pub fn evict_recency_filter(&self) {
        self.recency.evict();
    }

    /// Fetch deltas for every closer and collapse the batch by event id,
    /// keeping the most recently updated copy. The same event sits on every
    /// attendee closer's calendar.
    async fn fetch_and_dedupe(
        &self,
        tenant: &Tenant,
        closers: &[Closer],
        since: DateTime<Utc>,
    ) -> Vec<CanonicalCalendarEvent> {
        let Some(adapter) = self.adapters.get(CALENDAR_PROVIDER) else {
            tracing::error!(provider = CALENDAR_PROVIDER, "no calendar adapter registered");
            return Vec::new();
        };

        let mut raws: Vec<Value> = Vec::new();
        for closer in closers {
            match self.api.list_changed_events(closer, since).await {
                Ok(mut items) => raws.append(&mut items),
                Err(e) => {
                    tracing::warn!(
                        tenant = %tenant.id,
                        closer = %closer.id,
                        error = %e,
                        "delta fetch failed for closer (continuing)"
                    );
                }
            }
        }

        let mut by_id: HashMap<String, CanonicalCalendarEvent> = HashMap::new();
        for raw in &raws {
            let event = match adapter.normalize(raw) {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(tenant = %tenant.id, error = %e, "unnormalizable event, skipped");
                    continue;
                }
            };
            match by_id.get(&event.event_id) {
                Some(existing) if !newer_than(&event, existing) => {}
                _ => {
                    by_id.insert(event.event_id.clone(), event);
                }
            }
        }
        by_id.into_values().collect()
    }

    /// The single-event pipeline.
    async fn process_event(
        &self,
        tenant: &Tenant,
        event: &CanonicalCalendarEvent,
    ) -> Result<DispatchOutcome> {
        // Duplicate push notifications arrive in bursts; drop repeats seen
        // within the window.
        if !self.recency.check_and_mark(event) {
            tracing::debug!(event = %event.event_id, "duplicate notification, skipped");
            return Ok(DispatchOutcome::Skipped("recent duplicate"));
        }

        // Cancellations bypass the title filter: providers strip titles
        // from cancelled events.
        if !event.is_cancelled() && !tenant.title_matches_filters(&event.title) {
            return Ok(DispatchOutcome::Skipped("title filtered"));
        }

        let Some(closer) = self.resolve_closer(tenant, event).await? else {
            self.alerts
                .send(
                    Alert::new(
                        AlertSeverity::Medium,
                        "calendar event matches no closer",
                        &format!(
                            "event {} organizer {} has no active closer in tenant",
                            event.event_id, event.organizer_email
                        ),
                    )
                    .tenant(&tenant.id)
                    .action("check closer work emails for this tenant"),
                )
                .await;
            return Ok(DispatchOutcome::Skipped("no closer match"));
        };

        self.machine.handle_calendar_event(tenant, &closer, event).await
    }

    /// Organizer email first, then each non-organizer attendee.
    async fn resolve_closer(
        &self,
        tenant: &Tenant,
        event: &CanonicalCalendarEvent,
    ) -> Result<Option<Closer>> {
        if let Some(closer) = self
            .warehouse
            .find_closer_by_email(&tenant.id, &event.organizer_email)
            .await?
        {
            return Ok(Some(closer));
        }
        for attendee in event.attendees.iter().filter(|a| !a.is_organizer) {
            if let Some(closer) = self
                .warehouse
                .find_closer_by_email(&tenant.id, &attendee.email)
                .await?
            {
                return Ok(Some(closer));
            }
        }
        Ok(None)
    }
}

fn newer_than(a: &CanonicalCalendarEvent, b: &CanonicalCalendarEvent) -> bool {
    let parse = |e: &CanonicalCalendarEvent| {
        e.updated
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    };
    match (parse(a), parse(b)) {
        (Some(ua), Some(ub)) => ua >= ub,
        // Without stamps, later in the batch wins.
        _ => true,
    }
}
