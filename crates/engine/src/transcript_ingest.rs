//! Transcript orchestrator.
//!
//! Normalizes provider payloads, resolves the tenant through the recorder's
//! identity, matches (or creates) the call, evaluates whether a real
//! conversation happened, and drives the Show/Ghosted transition. Show
//! transitions invoke the AI pipeline synchronously; an AI failure never
//! reverts the Show.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use cs_domain::audit::{AuditAction, AuditEntry, TriggerSource};
use cs_domain::call::{Call, CallPatch, IngestSource, UNKNOWN_PROSPECT};
use cs_domain::error::{Error, Result};
use cs_domain::event::CanonicalTranscript;
use cs_domain::taxonomy::{CallState, ProcessingState};
use cs_domain::tenant::{Closer, Tenant};
use cs_domain::transitions::Trigger;
use cs_providers::transcript::{Normalized, TranscriptRegistry};
use cs_warehouse::Warehouse;

use crate::ai::AiPipeline;
use crate::alerts::{Alert, AlertSeverity, AlertSink};
use crate::audit::AuditWriter;
use crate::state_machine::StateMachine;

/// A conversation needs at least this much flattened text…
pub const MIN_TRANSCRIPT_CHARS: usize = 50;
/// …and at least this many distinct speakers.
pub const MIN_SPEAKERS: usize = 2;
/// Matching tolerance between transcript time and scheduled start.
pub const MATCH_WINDOW_MINUTES: i64 = 30;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Evaluation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Show,
    Ghosted,
}

/// Did a conversation happen? The AI handles outcome nuance; this only
/// separates "conversation happened" from "it didn't".
pub fn evaluate(transcript: &CanonicalTranscript) -> Evaluation {
    if transcript.transcript_text.is_empty() {
        return Evaluation::Ghosted;
    }
    if transcript.transcript_text.chars().count() < MIN_TRANSCRIPT_CHARS {
        return Evaluation::Ghosted;
    }
    if transcript.speaker_count() < MIN_SPEAKERS {
        return Evaluation::Ghosted;
    }
    Evaluation::Show
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Matching
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn transcript_time(transcript: &CanonicalTranscript) -> Option<DateTime<Utc>> {
    transcript
        .scheduled_start
        .as_deref()
        .or(transcript.recording_start.as_deref())
        .and_then(cs_domain::call::parse_wall_clock)
}

/// Two-tier match against pre-outcome candidates: (a) prospect email plus
/// scheduled time within the window, then (b) time alone. Closest start
/// wins within a tier.
pub fn match_call(candidates: &[Call], transcript: &CanonicalTranscript) -> Option<Call> {
    let when = transcript_time(transcript)?;
    let window = chrono::Duration::minutes(MATCH_WINDOW_MINUTES);

    let in_window = |call: &&Call| {
        call.start_utc()
            .is_some_and(|start| (start - when).abs() <= window)
    };
    let distance = |call: &Call| {
        call.start_utc()
            .map(|start| (start - when).abs())
            .unwrap_or(chrono::TimeDelta::MAX)
    };

    if let Some(email) = &transcript.prospect_email {
        let email = cs_domain::tenant::normalize_email(email);
        if let Some(hit) = candidates
            .iter()
            .filter(|c| c.prospect_email == email)
            .filter(in_window)
            .min_by_key(|c| distance(c))
        {
            return Some(hit.clone());
        }
    }

    candidates
        .iter()
        .filter(in_window)
        .min_by_key(|c| distance(c))
        .cloned()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Set only by the polling sweeper: pins the tenant for closer resolution
/// and the exact call to update.
#[derive(Debug, Clone)]
pub struct CallHint {
    pub call_id: String,
    pub tenant_id: String,
}

#[derive(Debug)]
pub enum IngestOutcome {
    Processed { call: Call, shown: bool },
    /// Metadata-only payload; the sweeper pulls the meeting later.
    NeedsPolling { meeting_id: String },
    /// Recorder matches no closer anywhere; nothing was created.
    Unidentified,
    /// This transcript already drove its call; the re-delivery is a no-op.
    AlreadyProcessed { call_id: String },
}

pub struct TranscriptIngest {
    warehouse: Arc<dyn Warehouse>,
    machine: Arc<StateMachine>,
    registry: Arc<TranscriptRegistry>,
    ai: Arc<AiPipeline>,
    audit: Arc<AuditWriter>,
    alerts: Arc<dyn AlertSink>,
}

impl TranscriptIngest {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        machine: Arc<StateMachine>,
        registry: Arc<TranscriptRegistry>,
        ai: Arc<AiPipeline>,
        audit: Arc<AuditWriter>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            warehouse,
            machine,
            registry,
            ai,
            audit,
            alerts,
        }
    }

    /// Entry point for a webhook payload or a pulled meeting.
    pub async fn ingest(
        &self,
        provider_key: &str,
        raw: &Value,
        hint: Option<&CallHint>,
    ) -> Result<IngestOutcome> {
        let adapter = self
            .registry
            .adapter(provider_key)
            .ok_or_else(|| Error::Validation(format!("unknown transcript provider '{provider_key}'")))?;

        let transcript = match adapter.normalize(raw)? {
            Normalized::Transcript(t) => *t,
            Normalized::MetadataOnly { meeting_id } => {
                tracing::debug!(provider = provider_key, meeting = %meeting_id, "metadata-only payload");
                return Ok(IngestOutcome::NeedsPolling { meeting_id });
            }
        };

        let Some((tenant, closer)) = self.resolve_tenant(&transcript, hint).await? else {
            return Ok(IngestOutcome::Unidentified);
        };

        // A transcript that already drove a call to its conversational
        // state must not create or move anything on re-delivery.
        if let Some(url) = &transcript.transcript_url {
            if let Some(existing) = self
                .warehouse
                .find_call_by_transcript_url(&tenant.id, url)
                .await?
            {
                if !existing.attendance.is_pre_outcome() {
                    tracing::info!(
                        tenant = %tenant.id,
                        call = %existing.id,
                        "transcript re-delivery, already processed"
                    );
                    return Ok(IngestOutcome::AlreadyProcessed {
                        call_id: existing.id,
                    });
                }
            }
        }

        let call = match self.resolve_call(&tenant, &closer, &transcript, hint).await? {
            ResolvedCall::Existing(call) => call,
            ResolvedCall::Done(outcome) => return Ok(outcome),
        };

        self.apply_transcript(&tenant, &closer, call, &transcript).await
    }

    async fn resolve_tenant(
        &self,
        transcript: &CanonicalTranscript,
        hint: Option<&CallHint>,
    ) -> Result<Option<(Tenant, Closer)>> {
        let closer = match hint {
            Some(hint) => {
                self.warehouse
                    .find_closer_by_email(&hint.tenant_id, &transcript.closer_email)
                    .await?
            }
            None => {
                let mut matches = self
                    .warehouse
                    .find_closers_by_email_all_tenants(&transcript.closer_email)
                    .await?;
                if matches.len() > 1 {
                    // Work emails are unique per tenant but nothing stops
                    // two tenants registering the same address.
                    matches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                    self.alerts
                        .send(
                            Alert::new(
                                AlertSeverity::Medium,
                                "ambiguous transcript recorder",
                                &format!(
                                    "recorder {} matches closers in {} tenants; using the oldest",
                                    transcript.closer_email,
                                    matches.len()
                                ),
                            )
                            .action("give each tenant's closer a distinct work email"),
                        )
                        .await;
                }
                matches.into_iter().next()
            }
        };

        let Some(closer) = closer else {
            self.alerts
                .send(
                    Alert::new(
                        AlertSeverity::High,
                        "transcript from unknown recorder",
                        &format!(
                            "no active closer with work email {} ({} meeting {})",
                            transcript.closer_email, transcript.provider, transcript.meeting_id
                        ),
                    )
                    .action("onboard the closer or correct their work email"),
                )
                .await;
            return Ok(None);
        };

        let Some(tenant) = self.warehouse.get_tenant(&closer.tenant_id).await? else {
            tracing::error!(closer = %closer.id, tenant = %closer.tenant_id, "closer's tenant missing");
            return Ok(None);
        };
        Ok(Some((tenant, closer)))
    }

    async fn resolve_call(
        &self,
        tenant: &Tenant,
        closer: &Closer,
        transcript: &CanonicalTranscript,
        hint: Option<&CallHint>,
    ) -> Result<ResolvedCall> {
        // Hinted call: the sweeper already matched; use it directly while
        // it is still pre-outcome.
        if let Some(hint) = hint {
            if let Some(call) = self.warehouse.get_call(&tenant.id, &hint.call_id).await? {
                if call.attendance.is_pre_outcome() {
                    return Ok(ResolvedCall::Existing(call));
                }
                return Ok(ResolvedCall::Done(IngestOutcome::AlreadyProcessed {
                    call_id: call.id,
                }));
            }
        }

        // A previous delivery of this meeting may have created the
        // synthetic record already.
        let synthetic_id = format!("transcript_{}", transcript.meeting_id);
        if let Some(call) = self
            .warehouse
            .find_call_by_event(&tenant.id, &synthetic_id)
            .await?
        {
            if call.attendance.is_pre_outcome() {
                return Ok(ResolvedCall::Existing(call));
            }
            return Ok(ResolvedCall::Done(IngestOutcome::AlreadyProcessed {
                call_id: call.id,
            }));
        }

        let candidates = self
            .warehouse
            .pre_outcome_calls_for_closer(&tenant.id, &closer.id)
            .await?;
        if let Some(call) = match_call(&candidates, transcript) {
            return Ok(ResolvedCall::Existing(call));
        }

        // No calendar match: create a transcript-ingested call. A later
        // calendar event with a real id will not reconcile with this
        // synthetic record; accepted.
        let mut call = Call::new(
            &tenant.id,
            &closer.id,
            &synthetic_id,
            transcript
                .scheduled_start
                .as_deref()
                .or(transcript.recording_start.as_deref())
                .unwrap_or(""),
            transcript.recording_end.as_deref(),
            "UTC",
        );
        call.source = IngestSource::Transcript;
        call.transcript_provider = Some(transcript.provider.clone());
        if let Some(email) = &transcript.prospect_email {
            call.prospect_email = cs_domain::tenant::normalize_email(email);
        }
        call.prospect_name = transcript.prospect_name.clone();
        call.call_type = self
            .machine
            .determine_call_type(&tenant.id, &call.prospect_email)
            .await?;
        self.warehouse.insert_call(&tenant.id, &call).await?;
        self.audit
            .record(
                AuditEntry::new(
                    &tenant.id,
                    "call",
                    &call.id,
                    AuditAction::Created,
                    TriggerSource::TranscriptWebhook,
                )
                .with_metadata(serde_json::json!({
                    "provider": transcript.provider,
                    "meeting_id": transcript.meeting_id,
                })),
            )
            .await;
        tracing::info!(
            tenant = %tenant.id,
            call = %call.id,
            provider = %transcript.provider,
            "call created from transcript (no calendar match)"
        );
        Ok(ResolvedCall::Existing(call))
    }

    /// Evaluate and apply the merged Show/Ghosted update, then run AI on
    /// Show.
    async fn apply_transcript(
        &self,
        tenant: &Tenant,
        closer: &Closer,
        call: Call,
        transcript: &CanonicalTranscript,
    ) -> Result<IngestOutcome> {
        let evaluation = evaluate(transcript);
        let (state, trigger, processing) = match evaluation {
            Evaluation::Show => (CallState::Show, Trigger::TranscriptValid, ProcessingState::Queued),
            Evaluation::Ghosted => (
                CallState::Ghosted,
                Trigger::TranscriptEmpty,
                ProcessingState::Complete,
            ),
        };

        let mut patch = CallPatch {
            transcript_provider: Some(transcript.provider.clone()),
            recording_url: transcript.share_url.clone(),
            transcript_url: transcript.transcript_url.clone(),
            duration_minutes: transcript.duration_minutes,
            processing_state: Some(processing),
            ..Default::default()
        };
        // A calendar-created call may still carry the unknown sentinel; the
        // transcript's invitee list is the upgrade path.
        if call.prospect_email == UNKNOWN_PROSPECT {
            if let Some(email) = &transcript.prospect_email {
                let email = cs_domain::tenant::normalize_email(email);
                patch.call_type =
                    Some(self.machine.determine_call_type(&tenant.id, &email).await?);
                patch.prospect_email = Some(email);
                if call.prospect_name.is_none() {
                    patch.prospect_name = transcript.prospect_name.clone();
                }
            }
        }

        let updated = match self
            .machine
            .transition(
                &tenant.id,
                &call.id,
                state,
                trigger,
                patch,
                TriggerSource::TranscriptWebhook,
            )
            .await
        {
            Ok(c) => c,
            // Lost the race with another delivery; the error audit entry
            // is already written.
            Err(Error::InvalidTransition { .. }) => {
                return Ok(IngestOutcome::AlreadyProcessed { call_id: call.id })
            }
            Err(e) => return Err(e),
        };

        let shown = evaluation == Evaluation::Show;
        if shown {
            self.machine.detect_overbooked(&tenant.id, &updated).await;
            if !transcript.transcript_text.is_empty() {
                // Synchronous analysis; failure leaves the Show in place
                // with processing state error.
                if let Err(e) = self
                    .ai
                    .analyze(tenant, &updated, closer, &transcript.transcript_text)
                    .await
                {
                    tracing::error!(
                        tenant = %tenant.id,
                        call = %updated.id,
                        error = %e,
                        "AI analysis failed; call remains Show with processing error"
                    );
                }
            }
        }

        let final_call = self
            .warehouse
            .get_call(&tenant.id, &updated.id)
            .await?
            .unwrap_or(updated);
        Ok(IngestOutcome::Processed {
            call: final_call,
            shown,
        })
    }
}

enum ResolvedCall {
    Existing(Call),
    Done(IngestOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(text: &str, speakers: &[&str]) -> CanonicalTranscript {
        CanonicalTranscript {
            provider: "fathom".into(),
            meeting_id: "m1".into(),
            closer_email: "sarah@x.com".into(),
            prospect_email: Some("john@ex.com".into()),
            prospect_name: Some("John Smith".into()),
            title: None,
            summary: None,
            scheduled_start: Some("2026-02-20T20:00:00Z".into()),
            recording_start: Some("2026-02-20T20:02:00Z".into()),
            recording_end: Some("2026-02-20T20:50:00Z".into()),
            duration_minutes: Some(48),
            transcript_text: text.into(),
            share_url: None,
            transcript_url: None,
            speakers: speakers
                .iter()
                .map(|name| cs_domain::event::SpeakerStats {
                    name: name.to_string(),
                    utterances: 1,
                    words: 5,
                })
                .collect(),
            raw: Value::Null,
        }
    }

    #[test]
    fn evaluation_boundary_at_fifty_chars() {
        let text_50: String = "a".repeat(50);
        let text_49: String = "a".repeat(49);
        assert_eq!(
            evaluate(&transcript(&text_50, &["Sarah", "John"])),
            Evaluation::Show
        );
        assert_eq!(
            evaluate(&transcript(&text_49, &["Sarah", "John"])),
            Evaluation::Ghosted
        );
    }

    #[test]
    fn evaluation_requires_two_speakers() {
        let text: String = "a".repeat(200);
        assert_eq!(evaluate(&transcript(&text, &["Sarah"])), Evaluation::Ghosted);
        assert_eq!(evaluate(&transcript("", &["Sarah", "John"])), Evaluation::Ghosted);
        // A short prospect contribution is still a Show: speaker count and
        // total length are the only gates.
        assert_eq!(
            evaluate(&transcript(&text, &["Sarah", "John"])),
            Evaluation::Show
        );
    }

    #[test]
    fn match_prefers_prospect_email_tier() {
        let mut by_email = Call::new("t1", "c1", "evt1", "2026-02-20T20:15:00Z", None, "UTC");
        by_email.prospect_email = "john@ex.com".into();
        let by_time = Call::new("t1", "c1", "evt2", "2026-02-20T20:01:00Z", None, "UTC");
        let candidates = vec![by_time.clone(), by_email.clone()];
        let hit = match_call(&candidates, &transcript("text", &[])).unwrap();
        // evt2 is closer in time, but the email tier wins outright.
        assert_eq!(hit.id, by_email.id);
    }

    #[test]
    fn match_falls_back_to_time_tier() {
        let mut other_prospect =
            Call::new("t1", "c1", "evt1", "2026-02-20T20:05:00Z", None, "UTC");
        other_prospect.prospect_email = "someone@else.com".into();
        let candidates = vec![other_prospect.clone()];
        let hit = match_call(&candidates, &transcript("text", &[])).unwrap();
        assert_eq!(hit.id, other_prospect.id);
    }

    #[test]
    fn match_rejects_calls_outside_window() {
        let mut far = Call::new("t1", "c1", "evt1", "2026-02-20T22:00:00Z", None, "UTC");
        far.prospect_email = "john@ex.com".into();
        assert!(match_call(&[far], &transcript("text", &[])).is_none());
    }

    #[test]
    fn match_requires_some_transcript_time() {
        let call = Call::new("t1", "c1", "evt1", "2026-02-20T20:00:00Z", None, "UTC");
        let mut t = transcript("text", &[]);
        t.scheduled_start = None;
        t.recording_start = None;
        assert!(match_call(&[call], &t).is_none());
    }
}
