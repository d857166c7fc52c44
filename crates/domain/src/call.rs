//! The central entity: a scheduled or held sales call, plus the partial
//! update shape the warehouse applies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::taxonomy::{CallOutcome, CallState, CallType, ProcessingState};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ingestion source
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestSource {
    #[default]
    Calendar,
    Transcript,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AI scores
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The seven per-dimension scores, all on 1-10. `None` until analysis runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub discovery: Option<u8>,
    pub pitch: Option<u8>,
    pub close_attempt: Option<u8>,
    pub objection_handling: Option<u8>,
    pub overall: Option<u8>,
    pub script_adherence: Option<u8>,
    pub prospect_fit: Option<u8>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Call
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Sentinel prospect email used until a real address is known.
pub const UNKNOWN_PROSPECT: &str = "unknown";

/// A scheduled or held meeting. `id` is freshly generated and is the primary
/// key; `external_event_id` is the calendar provider's identifier and is NOT
/// unique within a tenant (follow-up reuse creates a second row with the
/// same external id).
///
/// Time fields are ISO-8601 strings preserving the original offset, matching
/// the legacy warehouse layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: String,
    pub external_event_id: String,
    pub tenant_id: String,
    pub closer_id: String,

    pub prospect_email: String,
    pub prospect_name: Option<String>,

    pub scheduled_start: String,
    pub scheduled_end: Option<String>,
    pub timezone: String,

    pub attendance: CallState,
    pub call_outcome: Option<CallOutcome>,
    pub call_type: CallType,

    pub transcript_provider: Option<String>,
    pub recording_url: Option<String>,
    pub transcript_url: Option<String>,
    pub call_url: Option<String>,
    pub duration_minutes: Option<u32>,

    #[serde(flatten)]
    pub scores: Scores,
    pub prospect_temperature: Option<String>,
    pub ai_goals: Option<String>,
    pub ai_pains: Option<String>,
    pub ai_situation: Option<String>,
    pub ai_summary: Option<String>,
    pub ai_feedback: Option<String>,

    pub revenue_generated: f64,
    pub cash_collected: f64,
    pub payment_plan: Option<String>,
    pub product_name: Option<String>,
    pub date_closed: Option<String>,
    pub lost_reason: Option<String>,

    pub processing_state: ProcessingState,
    pub source: IngestSource,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Call {
    /// A new calendar-ingested call in the unset state.
    pub fn new(
        tenant_id: &str,
        closer_id: &str,
        external_event_id: &str,
        scheduled_start: &str,
        scheduled_end: Option<&str>,
        timezone: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            external_event_id: external_event_id.to_string(),
            tenant_id: tenant_id.to_string(),
            closer_id: closer_id.to_string(),
            prospect_email: UNKNOWN_PROSPECT.to_string(),
            prospect_name: None,
            scheduled_start: scheduled_start.to_string(),
            scheduled_end: scheduled_end.map(str::to_string),
            timezone: timezone.to_string(),
            attendance: CallState::Unset,
            call_outcome: None,
            call_type: CallType::FirstCall,
            transcript_provider: None,
            recording_url: None,
            transcript_url: None,
            call_url: None,
            duration_minutes: None,
            scores: Scores::default(),
            prospect_temperature: None,
            ai_goals: None,
            ai_pains: None,
            ai_situation: None,
            ai_summary: None,
            ai_feedback: None,
            revenue_generated: 0.0,
            cash_collected: 0.0,
            payment_plan: None,
            product_name: None,
            date_closed: None,
            lost_reason: None,
            processing_state: ProcessingState::Pending,
            source: IngestSource::Calendar,
            created_at: now,
            updated_at: now,
        }
    }

    /// Parse the scheduled start into UTC. Legacy rows may carry strings
    /// without an offset; those are treated as UTC.
    pub fn start_utc(&self) -> Option<DateTime<Utc>> {
        parse_wall_clock(&self.scheduled_start)
    }

    /// Parse the scheduled end, falling back to the start when absent.
    pub fn end_utc(&self) -> Option<DateTime<Utc>> {
        self.scheduled_end
            .as_deref()
            .and_then(parse_wall_clock)
            .or_else(|| self.start_utc())
    }
}

/// Parse a legacy ISO wall-clock string into UTC. Accepts full RFC 3339 and
/// bare `YYYY-MM-DDTHH:MM:SS` (assumed UTC).
pub fn parse_wall_clock(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Partial updates
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Field-level patch applied by `Warehouse::update_call`. `None` leaves the
/// field untouched; `Some` overwrites. Fields that are themselves optional
/// on the call use a doubled Option so a patch can write an explicit value
/// without being able to accidentally null one out.
#[derive(Debug, Clone, Default)]
pub struct CallPatch {
    pub attendance: Option<CallState>,
    pub call_outcome: Option<CallOutcome>,
    pub call_type: Option<CallType>,
    pub prospect_email: Option<String>,
    pub prospect_name: Option<String>,
    pub scheduled_start: Option<String>,
    pub scheduled_end: Option<String>,
    pub timezone: Option<String>,
    pub transcript_provider: Option<String>,
    pub recording_url: Option<String>,
    pub transcript_url: Option<String>,
    pub call_url: Option<String>,
    pub duration_minutes: Option<u32>,
    pub scores: Option<Scores>,
    pub prospect_temperature: Option<String>,
    pub ai_goals: Option<String>,
    pub ai_pains: Option<String>,
    pub ai_situation: Option<String>,
    pub ai_summary: Option<String>,
    pub ai_feedback: Option<String>,
    pub revenue_generated: Option<f64>,
    pub cash_collected: Option<f64>,
    pub payment_plan: Option<String>,
    pub product_name: Option<String>,
    pub date_closed: Option<String>,
    pub lost_reason: Option<String>,
    pub processing_state: Option<ProcessingState>,
}

impl CallPatch {
    /// Apply this patch onto a call, bumping `updated_at`.
    pub fn apply(&self, call: &mut Call) {
        macro_rules! set {
            ($field:ident) => {
                if let Some(v) = &self.$field {
                    call.$field = Some(v.clone());
                }
            };
        }
        if let Some(v) = self.attendance {
            call.attendance = v;
        }
        if let Some(v) = self.call_outcome {
            call.call_outcome = Some(v);
        }
        if let Some(v) = self.call_type {
            call.call_type = v;
        }
        if let Some(v) = &self.prospect_email {
            call.prospect_email = v.clone();
        }
        set!(prospect_name);
        if let Some(v) = &self.scheduled_start {
            call.scheduled_start = v.clone();
        }
        set!(scheduled_end);
        if let Some(v) = &self.timezone {
            call.timezone = v.clone();
        }
        set!(transcript_provider);
        set!(recording_url);
        set!(transcript_url);
        set!(call_url);
        if let Some(v) = self.duration_minutes {
            call.duration_minutes = Some(v);
        }
        if let Some(v) = self.scores {
            call.scores = v;
        }
        set!(prospect_temperature);
        set!(ai_goals);
        set!(ai_pains);
        set!(ai_situation);
        set!(ai_summary);
        set!(ai_feedback);
        if let Some(v) = self.revenue_generated {
            call.revenue_generated = v;
        }
        if let Some(v) = self.cash_collected {
            call.cash_collected = v;
        }
        set!(payment_plan);
        set!(product_name);
        set!(date_closed);
        set!(lost_reason);
        if let Some(v) = self.processing_state {
            call.processing_state = v;
        }
        call.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_call_starts_unset_and_unknown() {
        let c = Call::new("t1", "c1", "evt_1", "2026-02-20T20:00:00+00:00", None, "UTC");
        assert_eq!(c.attendance, CallState::Unset);
        assert_eq!(c.prospect_email, UNKNOWN_PROSPECT);
        assert_eq!(c.processing_state, ProcessingState::Pending);
        assert!(c.call_outcome.is_none());
    }

    #[test]
    fn wall_clock_parses_offsets_and_bare_strings() {
        let a = parse_wall_clock("2026-02-20T20:00:00+02:00").unwrap();
        assert_eq!(a.to_rfc3339(), "2026-02-20T18:00:00+00:00");
        let b = parse_wall_clock("2026-02-20T20:00:00").unwrap();
        assert_eq!(b.to_rfc3339(), "2026-02-20T20:00:00+00:00");
        assert!(parse_wall_clock("yesterday").is_none());
    }

    #[test]
    fn end_utc_falls_back_to_start() {
        let c = Call::new("t1", "c1", "evt_1", "2026-02-20T20:00:00Z", None, "UTC");
        assert_eq!(c.end_utc(), c.start_utc());
    }

    #[test]
    fn patch_overwrites_only_set_fields() {
        let mut c = Call::new("t1", "c1", "evt_1", "2026-02-20T20:00:00Z", None, "UTC");
        c.prospect_name = Some("John Smith".into());
        let patch = CallPatch {
            attendance: Some(CallState::Show),
            duration_minutes: Some(48),
            ..Default::default()
        };
        patch.apply(&mut c);
        assert_eq!(c.attendance, CallState::Show);
        assert_eq!(c.duration_minutes, Some(48));
        assert_eq!(c.prospect_name.as_deref(), Some("John Smith"));
    }
}
