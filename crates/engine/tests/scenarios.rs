//! End-to-end scenarios: calendar ingest → transcript → AI → payments,
//! wired exactly as the gateway wires them but with stub provider APIs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};

use cs_domain::call::Call;
use cs_domain::config::{CalendarConfig, LlmConfig, SweeperConfig};
use cs_domain::error::Result;
use cs_domain::taxonomy::{CallOutcome, CallState, CallType, PaymentType, ProcessingState};
use cs_domain::tenant::{Closer, Tenant};
use cs_engine::ai::AiPipeline;
use cs_engine::alerts::RecordingAlertSink;
use cs_engine::audit::AuditWriter;
use cs_engine::calendar_sync::CalendarSync;
use cs_engine::payments::{PaymentAction, PaymentEvent, PaymentProcessor};
use cs_engine::state_machine::StateMachine;
use cs_engine::sweeper::Sweeper;
use cs_engine::transcript_ingest::{IngestOutcome, TranscriptIngest};
use cs_providers::calendar::{CalendarAdapterRegistry, CalendarApi, WatchChannel};
use cs_providers::llm::{AnalysisRequest, AnalysisResponse, LlmProvider, Usage};
use cs_providers::transcript::TranscriptRegistry;
use cs_warehouse::{MemoryWarehouse, Warehouse};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stub providers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct StubCalendarApi {
    events: Mutex<Vec<Value>>,
}

impl StubCalendarApi {
    fn push(&self, event: Value) {
        self.events.lock().push(event);
    }
}

#[async_trait]
impl CalendarApi for StubCalendarApi {
    async fn list_changed_events(
        &self,
        _closer: &Closer,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Value>> {
        Ok(self.events.lock().clone())
    }

    async fn create_watch(
        &self,
        _closer: &Closer,
        channel_id: &str,
        _token: &str,
        _callback_url: &str,
    ) -> Result<WatchChannel> {
        Ok(WatchChannel {
            channel_id: channel_id.to_string(),
            resource_id: "res".into(),
            expiry: Utc::now(),
        })
    }

    async fn stop_watch(&self, _channel_id: &str, _resource_id: &str) -> Result<()> {
        Ok(())
    }
}

struct StubLlm {
    response: Mutex<String>,
    calls: Mutex<u32>,
}

impl StubLlm {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(json!({ "call_outcome": "Follow Up" }).to_string()),
            calls: Mutex::new(0),
        })
    }

    fn set_response(&self, content: String) {
        *self.response.lock() = content;
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    async fn analyze(&self, _req: AnalysisRequest) -> Result<AnalysisResponse> {
        *self.calls.lock() += 1;
        Ok(AnalysisResponse {
            content: self.response.lock().clone(),
            usage: Usage {
                input_tokens: 12_000,
                output_tokens: 800,
            },
            model: "claude-sonnet-4-20250514".into(),
        })
    }

    fn provider_id(&self) -> &str {
        "stub"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Harness {
    warehouse: Arc<MemoryWarehouse>,
    machine: Arc<StateMachine>,
    calendar: CalendarSync,
    calendar_api: Arc<StubCalendarApi>,
    ingest: Arc<TranscriptIngest>,
    payments: PaymentProcessor,
    sweeper: Sweeper,
    llm: Arc<StubLlm>,
    alerts: Arc<RecordingAlertSink>,
}

impl Harness {
    fn new() -> Self {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let audit = Arc::new(AuditWriter::new(warehouse.clone()));
        let alerts = RecordingAlertSink::new();
        let machine = Arc::new(StateMachine::new(warehouse.clone(), audit.clone()));
        let llm = StubLlm::new();
        let ai = Arc::new(AiPipeline::new(
            llm.clone(),
            warehouse.clone(),
            machine.clone(),
            audit.clone(),
            LlmConfig::default(),
        ));
        let transcripts = Arc::new(TranscriptRegistry::with_builtins());
        let ingest = Arc::new(TranscriptIngest::new(
            warehouse.clone(),
            machine.clone(),
            transcripts.clone(),
            ai,
            audit.clone(),
            alerts.clone(),
        ));
        let calendar_api = Arc::new(StubCalendarApi::default());
        let calendar = CalendarSync::new(
            warehouse.clone(),
            machine.clone(),
            Arc::new(CalendarAdapterRegistry::with_builtins()),
            calendar_api.clone(),
            alerts.clone(),
            CalendarConfig::default(),
        );
        let payments = PaymentProcessor::new(
            warehouse.clone(),
            machine.clone(),
            audit.clone(),
            alerts.clone(),
        );
        let sweeper = Sweeper::new(
            warehouse.clone(),
            machine.clone(),
            ingest.clone(),
            transcripts,
            SweeperConfig::default(),
        );
        Self {
            warehouse,
            machine,
            calendar,
            calendar_api,
            ingest,
            payments,
            sweeper,
            llm,
            alerts,
        }
    }

    async fn tenant(&self, name: &str, closer_email: &str) -> (Tenant, Closer) {
        let mut tenant = Tenant::new(name);
        tenant.filter_phrases = vec!["strategy".into()];
        self.warehouse.insert_tenant(&tenant).await.unwrap();
        let closer = Closer::new(&tenant.id, "Sarah Lane", closer_email);
        self.warehouse.insert_closer(&tenant.id, &closer).await.unwrap();
        (tenant, closer)
    }

    async fn only_call(&self, tenant_id: &str) -> Call {
        let calls = self.warehouse.calls_for_tenant(tenant_id).await;
        assert_eq!(calls.len(), 1, "expected exactly one call");
        calls.into_iter().next().unwrap()
    }
}

fn google_event(event_id: &str, organizer: &str, prospect: &str, start: &str, end: &str) -> Value {
    json!({
        "id": event_id,
        "status": "confirmed",
        "summary": "Strategy Call with John Smith",
        "updated": "2026-02-19T10:00:00.000Z",
        "start": { "dateTime": start, "timeZone": "UTC" },
        "end": { "dateTime": end },
        "organizer": { "email": organizer },
        "attendees": [
            { "email": organizer, "organizer": true, "responseStatus": "accepted" },
            { "email": prospect, "responseStatus": "needsAction" }
        ]
    })
}

fn fathom_payload(closer_email: &str, prospect: &str, scheduled: &str) -> Value {
    let line = "We have been talking about the growth plan in detail today.";
    let utterances: Vec<Value> = (0..8)
        .map(|i| {
            let speaker = if i % 2 == 0 { "Sarah Lane" } else { "John Smith" };
            json!({
                "speaker": { "display_name": speaker },
                "text": line,
                "timestamp": format!("00:{:02}:00", i * 5)
            })
        })
        .collect();
    json!({
        "id": 88421,
        "title": "Strategy Call with John Smith",
        "url": "https://fathom.video/calls/88421",
        "share_url": "https://fathom.video/share/abc",
        "meeting": { "scheduled_start_time": scheduled },
        "recording": {
            "start_time": "2026-02-20T20:02:00Z",
            "end_time": "2026-02-20T20:50:00Z"
        },
        "fathom_user": { "name": "Sarah Lane", "email": closer_email },
        "calendar_invitees": [
            { "name": "Sarah Lane", "email": closer_email, "is_external": false },
            { "name": "John Smith", "email": prospect, "is_external": true }
        ],
        "transcript": utterances
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenarios
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn first_call_happy_path() {
    let h = Harness::new();
    let (tenant, _) = h.tenant("friends_inc", "sarah@x.com").await;

    // Calendar push: event created.
    h.calendar_api.push(google_event(
        "evt_1",
        "sarah@x.com",
        "john@ex.com",
        "2026-02-20T20:00:00Z",
        "2026-02-20T21:00:00Z",
    ));
    h.calendar.handle_notification(&tenant.id).await.unwrap();

    let call = h.only_call(&tenant.id).await;
    assert_eq!(call.call_type, CallType::FirstCall);
    assert_eq!(call.prospect_email, "john@ex.com");
    assert_eq!(call.prospect_name.as_deref(), Some("John Smith"));
    assert_eq!(call.attendance, CallState::Unset);

    // Fathom webhook: Show + AI outcome in one pass.
    h.llm.set_response(
        json!({
            "call_outcome": "Follow Up",
            "overall_score": 7,
            "objections": [{
                "objection_type": "Think About It",
                "prospect_phrase": "I need to sleep on it",
                "seconds_into_call": 2110
            }]
        })
        .to_string(),
    );
    let outcome = h
        .ingest
        .ingest(
            "fathom",
            &fathom_payload("sarah@x.com", "john@ex.com", "2026-02-20T20:00:00Z"),
            None,
        )
        .await
        .unwrap();
    let processed = match outcome {
        IngestOutcome::Processed { call, shown } => {
            assert!(shown);
            call
        }
        other => panic!("expected processed, got {other:?}"),
    };
    assert_eq!(processed.id, call.id, "matched the calendar call");
    assert_eq!(processed.attendance, CallState::FollowUp);
    assert_eq!(processed.call_outcome, Some(CallOutcome::FollowUp));
    assert_eq!(processed.duration_minutes, Some(48));
    assert_eq!(processed.processing_state, ProcessingState::Complete);
    assert_eq!(processed.scores.overall, Some(7));

    let objections = h.warehouse.objections_for_call(&call.id).await;
    assert_eq!(objections.len(), 1);
    assert_eq!(objections[0].tenant_id, tenant.id);

    let costs = h.warehouse.costs_for_call(&call.id).await;
    assert_eq!(costs.len(), 1);
    // 12k input at $3/M + 800 output at $15/M.
    assert!((costs[0].total_cost_usd - 0.048).abs() < 1e-9);
}

#[tokio::test]
async fn duplicate_calendar_notification_is_idempotent() {
    let h = Harness::new();
    let (tenant, _) = h.tenant("friends_inc", "sarah@x.com").await;
    h.calendar_api.push(google_event(
        "evt_1",
        "sarah@x.com",
        "john@ex.com",
        "2026-02-20T20:00:00Z",
        "2026-02-20T21:00:00Z",
    ));

    // The provider delivers the same notification twice back-to-back.
    h.calendar.handle_notification(&tenant.id).await.unwrap();
    let second = h.calendar.handle_notification(&tenant.id).await.unwrap();

    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(h.warehouse.calls_for_tenant(&tenant.id).await.len(), 1);
}

#[tokio::test]
async fn ghost_then_timeout() {
    let h = Harness::new();
    let (tenant, _) = h.tenant("friends_inc", "sarah@x.com").await;
    h.calendar_api.push(google_event(
        "evt_1",
        "sarah@x.com",
        "john@ex.com",
        "2026-02-20T20:00:00Z",
        "2026-02-20T21:00:00Z",
    ));
    h.calendar.handle_notification(&tenant.id).await.unwrap();
    let call = h.only_call(&tenant.id).await;

    // After appointment end: pending -> Waiting.
    let after_end = Utc.with_ymd_and_hms(2026, 2, 20, 21, 10, 0).unwrap();
    h.sweeper.sweep_tenant(&tenant, after_end).await.unwrap();
    let c = h.warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
    assert_eq!(c.attendance, CallState::Waiting);

    // 120 minutes past end: Waiting -> Ghosted.
    let past_window = Utc.with_ymd_and_hms(2026, 2, 20, 23, 10, 0).unwrap();
    h.sweeper.sweep_tenant(&tenant, past_window).await.unwrap();
    let c = h.warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
    assert_eq!(c.attendance, CallState::Ghosted);
}

#[tokio::test]
async fn reschedule_reuse_creates_new_call() {
    let h = Harness::new();
    let (tenant, closer) = h.tenant("friends_inc", "sarah@x.com").await;

    h.calendar_api.push(google_event(
        "evt_1",
        "sarah@x.com",
        "john@ex.com",
        "2026-02-20T20:00:00Z",
        "2026-02-20T21:00:00Z",
    ));
    h.calendar.handle_notification(&tenant.id).await.unwrap();
    let first = h.only_call(&tenant.id).await;

    // Held and analyzed as Follow Up.
    h.ingest
        .ingest(
            "fathom",
            &fathom_payload("sarah@x.com", "john@ex.com", "2026-02-20T20:00:00Z"),
            None,
        )
        .await
        .unwrap();
    let held = h.warehouse.get_call(&tenant.id, &first.id).await.unwrap().unwrap();
    assert_eq!(held.attendance, CallState::FollowUp);

    // The closer edits the same calendar event to a new date.
    let adapter_event = cs_providers::calendar::CalendarAdapterRegistry::with_builtins()
        .get("google")
        .unwrap()
        .normalize(&google_event(
            "evt_1",
            "sarah@x.com",
            "john@ex.com",
            "2026-02-25T20:00:00Z",
            "2026-02-25T21:00:00Z",
        ))
        .unwrap();
    h.machine
        .handle_calendar_event(&tenant, &closer, &adapter_event)
        .await
        .unwrap();

    let calls = h.warehouse.calls_for_tenant(&tenant.id).await;
    assert_eq!(calls.len(), 2);
    let new_call = calls.iter().find(|c| c.id != first.id).unwrap();
    assert_eq!(new_call.external_event_id, "evt_1");
    assert_eq!(new_call.call_type, CallType::FollowUp, "prior Show exists for prospect");
    let original = h.warehouse.get_call(&tenant.id, &first.id).await.unwrap().unwrap();
    assert_eq!(original.attendance, CallState::FollowUp, "original untouched");
    assert_eq!(original.scheduled_start, "2026-02-20T20:00:00Z");
}

#[tokio::test]
async fn refund_round_trip() {
    let h = Harness::new();
    let (tenant, _) = h.tenant("friends_inc", "sarah@x.com").await;
    h.calendar_api.push(google_event(
        "evt_1",
        "sarah@x.com",
        "john@ex.com",
        "2026-02-20T20:00:00Z",
        "2026-02-20T21:00:00Z",
    ));
    h.calendar.handle_notification(&tenant.id).await.unwrap();
    h.ingest
        .ingest(
            "fathom",
            &fathom_payload("sarah@x.com", "john@ex.com", "2026-02-20T20:00:00Z"),
            None,
        )
        .await
        .unwrap();
    let call = h.only_call(&tenant.id).await;

    let pay = |payment_type: PaymentType| PaymentEvent {
        prospect_email: "john@ex.com".into(),
        prospect_name: None,
        amount: 10_000.0,
        payment_date: Some("2026-02-21".into()),
        payment_type,
        product_name: None,
        notes: None,
    };

    assert_eq!(
        h.payments.process(&tenant.id, &pay(PaymentType::Full)).await.unwrap(),
        PaymentAction::NewClose
    );
    let c = h.warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
    assert_eq!(c.attendance, CallState::ClosedWon);
    assert_eq!(c.cash_collected, 10_000.0);

    assert_eq!(
        h.payments.process(&tenant.id, &pay(PaymentType::Refund)).await.unwrap(),
        PaymentAction::Refund
    );
    let c = h.warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
    assert_eq!(c.attendance, CallState::Lost);
    assert_eq!(c.cash_collected, 0.0);

    assert_eq!(
        h.payments.process(&tenant.id, &pay(PaymentType::Full)).await.unwrap(),
        PaymentAction::NewClose
    );
    let c = h.warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
    assert_eq!(c.attendance, CallState::ClosedWon);
    assert_eq!(c.cash_collected, 10_000.0);
}

#[tokio::test]
async fn cross_tenant_isolation() {
    let h = Harness::new();
    let (tenant_a, closer_a) = h.tenant("tenant_a", "sarah@a.com").await;
    let (tenant_b, closer_b) = h.tenant("tenant_b", "bob@b.com").await;

    // Same prospect, same time, one call per tenant.
    for (tenant, closer) in [(&tenant_a, &closer_a), (&tenant_b, &closer_b)] {
        let mut call = Call::new(
            &tenant.id,
            &closer.id,
            "evt_shared",
            "2026-02-20T20:00:00Z",
            Some("2026-02-20T21:00:00Z"),
            "UTC",
        );
        call.prospect_email = "john@ex.com".into();
        h.warehouse.insert_call(&tenant.id, &call).await.unwrap();
    }

    h.llm.set_response(
        json!({
            "call_outcome": "Follow Up",
            "objections": [{ "objection_type": "Timing", "prospect_phrase": "call me in spring" }]
        })
        .to_string(),
    );
    // Webhook from tenant A's closer only.
    h.ingest
        .ingest(
            "fathom",
            &fathom_payload("sarah@a.com", "john@ex.com", "2026-02-20T20:00:00Z"),
            None,
        )
        .await
        .unwrap();

    let a_call = h.only_call(&tenant_a.id).await;
    assert_eq!(a_call.attendance, CallState::FollowUp);
    let b_call = h.only_call(&tenant_b.id).await;
    assert_eq!(b_call.attendance, CallState::Unset, "tenant B untouched");

    let objections = h.warehouse.objections_for_call(&a_call.id).await;
    assert!(!objections.is_empty());
    assert!(objections.iter().all(|o| o.tenant_id == tenant_a.id));
    let audit = h.warehouse.audit_for_entity(&a_call.id).await;
    assert!(!audit.is_empty());
    assert!(audit.iter().all(|e| e.tenant_id == tenant_a.id));
}

#[tokio::test]
async fn double_booking_marks_overbooked() {
    let h = Harness::new();
    let (tenant, closer) = h.tenant("friends_inc", "sarah@x.com").await;

    let mut first = Call::new(
        &tenant.id,
        &closer.id,
        "evt_a",
        "2026-02-20T14:00:00Z",
        Some("2026-02-20T15:00:00Z"),
        "UTC",
    );
    first.prospect_email = "john@ex.com".into();
    let second = Call::new(
        &tenant.id,
        &closer.id,
        "evt_b",
        "2026-02-20T14:30:00Z",
        Some("2026-02-20T15:30:00Z"),
        "UTC",
    );
    h.warehouse.insert_call(&tenant.id, &first).await.unwrap();
    h.warehouse.insert_call(&tenant.id, &second).await.unwrap();

    h.ingest
        .ingest(
            "fathom",
            &fathom_payload("sarah@x.com", "john@ex.com", "2026-02-20T14:00:00Z"),
            None,
        )
        .await
        .unwrap();

    let shown = h.warehouse.get_call(&tenant.id, &first.id).await.unwrap().unwrap();
    assert!(shown.attendance.is_conversational(), "14:00 call shown");
    let bumped = h.warehouse.get_call(&tenant.id, &second.id).await.unwrap().unwrap();
    assert_eq!(bumped.attendance, CallState::Overbooked);
}

#[tokio::test]
async fn transcript_redelivery_is_idempotent() {
    let h = Harness::new();
    let (tenant, _) = h.tenant("friends_inc", "sarah@x.com").await;
    let payload = fathom_payload("sarah@x.com", "john@ex.com", "2026-02-20T20:00:00Z");

    h.ingest.ingest("fathom", &payload, None).await.unwrap();
    let first_pass = h.warehouse.calls_for_tenant(&tenant.id).await;
    assert_eq!(first_pass.len(), 1);
    let call_id = first_pass[0].id.clone();
    let objections_before = h.warehouse.objections_for_call(&call_id).await.len();

    // Same webhook again: no new call, no state movement, no new analysis.
    let outcome = h.ingest.ingest("fathom", &payload, None).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::AlreadyProcessed { .. }));
    assert_eq!(h.warehouse.calls_for_tenant(&tenant.id).await.len(), 1);
    assert_eq!(
        h.warehouse.objections_for_call(&call_id).await.len(),
        objections_before
    );
    assert_eq!(*h.llm.calls.lock(), 1, "analysis ran exactly once");
}

#[tokio::test]
async fn unknown_recorder_creates_nothing_and_alerts() {
    let h = Harness::new();
    let (tenant, _) = h.tenant("friends_inc", "sarah@x.com").await;

    let outcome = h
        .ingest
        .ingest(
            "fathom",
            &fathom_payload("stranger@nowhere.com", "john@ex.com", "2026-02-20T20:00:00Z"),
            None,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Unidentified));
    assert!(h.warehouse.calls_for_tenant(&tenant.id).await.is_empty());
    assert_eq!(
        h.alerts.count(cs_engine::alerts::AlertSeverity::High),
        1,
        "high-severity alert for unknown recorder"
    );
}
