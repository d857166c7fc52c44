//! The call lifecycle state machine and calendar event dispatch.
//!
//! Every attendance change in the system funnels through
//! [`StateMachine::transition`]: the validity check runs against the latest
//! persisted state, valid transitions write a `state_change` audit entry,
//! invalid attempts leave the record unchanged and write an `error` entry.
//! Concurrent writers are not serialized; the re-read inside `transition`
//! is what keeps a lost race from corrupting state.

use std::collections::HashSet;
use std::sync::Arc;

use cs_domain::audit::{AuditAction, AuditEntry, TriggerSource};
use cs_domain::call::{Call, CallPatch, UNKNOWN_PROSPECT};
use cs_domain::error::{Error, Result};
use cs_domain::event::CanonicalCalendarEvent;
use cs_domain::taxonomy::{CallOutcome, CallState, CallType};
use cs_domain::tenant::{normalize_email, Closer, Tenant};
use cs_domain::transitions::{self, Trigger};
use cs_warehouse::Warehouse;

use crate::audit::AuditWriter;
use crate::prospect_name::{extract_prospect, ProspectIdentity};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What calendar dispatch did with an incoming event.
#[derive(Debug)]
pub enum DispatchOutcome {
    Created(Call),
    Updated(Call),
    Canceled(Call),
    /// Nothing to do; the reason feeds logging only.
    Skipped(&'static str),
    /// Cancelled event with no existing record.
    Dropped,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct StateMachine {
    warehouse: Arc<dyn Warehouse>,
    audit: Arc<AuditWriter>,
}

impl StateMachine {
    pub fn new(warehouse: Arc<dyn Warehouse>, audit: Arc<AuditWriter>) -> Self {
        Self { warehouse, audit }
    }

    /// Drive a call to `to` via `trigger`, applying `extra` in the same
    /// write. Validates against the latest persisted state. When `to` is an
    /// outcome state, the call outcome is derived unless `extra` already
    /// carries one.
    pub async fn transition(
        &self,
        tenant_id: &str,
        call_id: &str,
        to: CallState,
        trigger: Trigger,
        mut extra: CallPatch,
        source: TriggerSource,
    ) -> Result<Call> {
        let current = self
            .warehouse
            .get_call(tenant_id, call_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("call {call_id}")))?;
        let from = current.attendance;

        if !transitions::is_valid(from, to, trigger) {
            self.audit
                .record(
                    AuditEntry::new(tenant_id, "call", call_id, AuditAction::Error, source)
                        .with_change("attendance", from.label(), to.label())
                        .with_detail(trigger.key())
                        .with_metadata(serde_json::json!({ "reason": "invalid_transition" })),
                )
                .await;
            return Err(Error::InvalidTransition {
                from: from.label().to_string(),
                to: to.label().to_string(),
                trigger: trigger.key().to_string(),
            });
        }

        extra.attendance = Some(to);
        if to.is_outcome_state() && extra.call_outcome.is_none() {
            extra.call_outcome = CallOutcome::from_state(to);
        }
        let updated = self.warehouse.update_call(tenant_id, call_id, &extra).await?;

        tracing::info!(
            tenant = %tenant_id,
            call = %call_id,
            from = %from,
            to = %to,
            trigger = %trigger,
            "call state change"
        );
        self.audit
            .record(
                AuditEntry::new(tenant_id, "call", call_id, AuditAction::StateChange, source)
                    .with_change("attendance", from.label(), to.label())
                    .with_detail(trigger.key()),
            )
            .await;
        Ok(updated)
    }

    /// First Call unless the prospect already has a conversational call in
    /// this tenant. Unknown prospects are always First Call.
    pub async fn determine_call_type(
        &self,
        tenant_id: &str,
        prospect_email: &str,
    ) -> Result<CallType> {
        if prospect_email.is_empty() || prospect_email == UNKNOWN_PROSPECT {
            return Ok(CallType::FirstCall);
        }
        let prior = self
            .warehouse
            .count_conversational_calls(tenant_id, prospect_email)
            .await?;
        Ok(if prior > 0 {
            CallType::FollowUp
        } else {
            CallType::FirstCall
        })
    }

    /// When a call shows, other pre-outcome calls of the same closer in the
    /// same window were overbooked. Any failure here is logged and never
    /// fails the Show that triggered it.
    pub async fn detect_overbooked(&self, tenant_id: &str, shown: &Call) {
        let (Some(start), Some(end)) = (shown.start_utc(), shown.end_utc()) else {
            return;
        };
        let others = match self
            .warehouse
            .overlapping_pre_outcome_calls(tenant_id, &shown.closer_id, start, end, &shown.id)
            .await
        {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(
                    tenant = %tenant_id,
                    call = %shown.id,
                    error = %e,
                    "overbook query failed (non-fatal)"
                );
                return;
            }
        };
        for other in others {
            if let Err(e) = self
                .transition(
                    tenant_id,
                    &other.id,
                    CallState::Overbooked,
                    Trigger::DoubleBooked,
                    CallPatch::default(),
                    TriggerSource::System,
                )
                .await
            {
                tracing::warn!(
                    tenant = %tenant_id,
                    call = %other.id,
                    error = %e,
                    "overbook transition failed (non-fatal)"
                );
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Calendar event dispatch
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Decide what an incoming canonical event means for the call keyed on
    /// (external event id, tenant): create, update in place, cancel, or
    /// skip.
    pub async fn handle_calendar_event(
        &self,
        tenant: &Tenant,
        closer: &Closer,
        event: &CanonicalCalendarEvent,
    ) -> Result<DispatchOutcome> {
        let existing = self
            .warehouse
            .find_call_by_event(&tenant.id, &event.event_id)
            .await?;

        let cancelled = event.is_cancelled() || !event.declined_attendees.is_empty();

        let Some(existing) = existing else {
            if cancelled {
                return Ok(DispatchOutcome::Dropped);
            }
            let call = self.create_from_event(tenant, closer, event).await?;
            return Ok(DispatchOutcome::Created(call));
        };

        if cancelled {
            // A call that already happened can no longer be cancelled.
            if existing.attendance.is_conversational() {
                return Ok(DispatchOutcome::Skipped("cancel after conversation"));
            }
            return match self
                .transition(
                    &tenant.id,
                    &existing.id,
                    CallState::Canceled,
                    Trigger::CalendarCancel,
                    CallPatch::default(),
                    TriggerSource::CalendarWebhook,
                )
                .await
            {
                Ok(call) => Ok(DispatchOutcome::Canceled(call)),
                // The invalid attempt already wrote its error audit entry.
                Err(Error::InvalidTransition { .. }) => {
                    Ok(DispatchOutcome::Skipped("cancel not applicable"))
                }
                Err(e) => Err(e),
            };
        }

        // The closer reused a held call's calendar event for a follow-up:
        // same external id, new call record.
        if existing.attendance.is_outcome_state()
            || (existing.attendance == CallState::Show && existing.call_outcome.is_some())
        {
            let call = self.create_from_event(tenant, closer, event).await?;
            return Ok(DispatchOutcome::Created(call));
        }

        if existing.attendance.is_pre_outcome() {
            return self.update_if_changed(tenant, closer, event, existing).await;
        }

        // Dead record, event alive again.
        match existing.attendance {
            CallState::Canceled | CallState::Rescheduled => {
                let call = self.create_from_event(tenant, closer, event).await?;
                Ok(DispatchOutcome::Created(call))
            }
            CallState::Ghosted | CallState::NoRecording => {
                if start_changed(&existing, event) {
                    let call = self.create_from_event(tenant, closer, event).await?;
                    Ok(DispatchOutcome::Created(call))
                } else {
                    Ok(DispatchOutcome::Skipped("dead record, unchanged time"))
                }
            }
            _ => Ok(DispatchOutcome::Skipped("no dispatch rule")),
        }
    }

    async fn tenant_closer_emails(&self, tenant_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .warehouse
            .list_active_closers(tenant_id)
            .await?
            .into_iter()
            .map(|c| c.work_email)
            .collect())
    }

    async fn create_from_event(
        &self,
        tenant: &Tenant,
        closer: &Closer,
        event: &CanonicalCalendarEvent,
    ) -> Result<Call> {
        let closer_emails = self.tenant_closer_emails(&tenant.id).await?;
        let identity = extract_prospect(event, closer, &closer_emails, &tenant.filter_phrases);

        let mut call = Call::new(
            &tenant.id,
            &closer.id,
            &event.event_id,
            &event.start,
            event.end.as_deref(),
            &event.timezone,
        );
        if let Some(email) = &identity.email {
            call.prospect_email = normalize_email(email);
        }
        call.prospect_name = identity.name.clone();
        call.transcript_provider = Some(tenant.default_transcript_provider.clone());
        call.call_type = self
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
                    TriggerSource::CalendarWebhook,
                )
                .with_metadata(serde_json::json!({
                    "external_event_id": event.event_id,
                    "title": event.title,
                    "call_type": call.call_type.label(),
                })),
            )
            .await;
        tracing::info!(
            tenant = %tenant.id,
            call = %call.id,
            event = %event.event_id,
            prospect = %call.prospect_email,
            "call created from calendar event"
        );
        Ok(call)
    }

    /// Pre-outcome record: mutate in place when the start time or the
    /// prospect identity moved, otherwise treat the event as a duplicate.
    async fn update_if_changed(
        &self,
        tenant: &Tenant,
        closer: &Closer,
        event: &CanonicalCalendarEvent,
        existing: Call,
    ) -> Result<DispatchOutcome> {
        let closer_emails = self.tenant_closer_emails(&tenant.id).await?;
        let identity = extract_prospect(event, closer, &closer_emails, &tenant.filter_phrases);

        let time_changed = start_changed(&existing, event);
        let prospect_changed = prospect_identity_changed(&existing, &identity);
        if !time_changed && !prospect_changed {
            return Ok(DispatchOutcome::Skipped("duplicate event"));
        }

        let mut patch = CallPatch {
            scheduled_start: Some(event.start.clone()),
            scheduled_end: event.end.clone(),
            timezone: Some(event.timezone.clone()),
            ..Default::default()
        };
        let mut changed: Vec<&str> = Vec::new();
        let mut call_type = existing.call_type;
        if prospect_changed {
            changed.push("prospect");
            if let Some(email) = &identity.email {
                let email = normalize_email(email);
                // Call type depends on the prospect; recompute on change.
                call_type = self.determine_call_type(&tenant.id, &email).await?;
                patch.prospect_email = Some(email);
            }
            if identity.name.is_some() {
                patch.prospect_name = identity.name.clone();
            }
        }
        if time_changed {
            changed.push("scheduled_start");
            call_type = call_type.as_rescheduled();
        }
        if call_type != existing.call_type {
            patch.call_type = Some(call_type);
        }

        let updated = self
            .warehouse
            .update_call(&tenant.id, &existing.id, &patch)
            .await?;
        self.audit
            .record(
                AuditEntry::new(
                    &tenant.id,
                    "call",
                    &existing.id,
                    AuditAction::Updated,
                    TriggerSource::CalendarWebhook,
                )
                .with_metadata(serde_json::json!({ "changed": changed })),
            )
            .await;
        Ok(DispatchOutcome::Updated(updated))
    }
}

/// Compare as instants when both parse, else as raw strings; providers
/// reformat offsets across deliveries.
fn start_changed(existing: &Call, event: &CanonicalCalendarEvent) -> bool {
    match (existing.start_utc(), cs_domain::call::parse_wall_clock(&event.start)) {
        (Some(a), Some(b)) => a != b,
        _ => existing.scheduled_start != event.start,
    }
}

fn prospect_identity_changed(existing: &Call, identity: &ProspectIdentity) -> bool {
    if let Some(email) = &identity.email {
        if normalize_email(email) != existing.prospect_email {
            return true;
        }
    }
    match (&identity.name, &existing.prospect_name) {
        (Some(new), Some(old)) => new != old,
        (Some(_), None) => true,
        _ => false,
    }
}
