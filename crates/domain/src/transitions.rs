//! The call-lifecycle transition table.
//!
//! The table is a value, not branches: the validator is a lookup, and adding
//! a state or trigger is a data change. Every attempted transition is checked
//! here against the latest persisted state before any write.

use serde::{Deserialize, Serialize};

use crate::taxonomy::CallState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Triggers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    CalendarCancel,
    CalendarMoved,
    TranscriptValid,
    TranscriptEmpty,
    TranscriptTimeout,
    AppointmentTimePassed,
    SystemFailure,
    DoubleBooked,
    Reprocess,
    AiOutcome,
    PaymentReceived,
    PaymentReceivedFull,
    NewCallScheduled,
}

impl Trigger {
    pub fn key(&self) -> &'static str {
        match self {
            Trigger::CalendarCancel => "calendar_cancel",
            Trigger::CalendarMoved => "calendar_moved",
            Trigger::TranscriptValid => "transcript_valid",
            Trigger::TranscriptEmpty => "transcript_empty",
            Trigger::TranscriptTimeout => "transcript_timeout",
            Trigger::AppointmentTimePassed => "appointment_time_passed",
            Trigger::SystemFailure => "system_failure",
            Trigger::DoubleBooked => "double_booked",
            Trigger::Reprocess => "reprocess",
            Trigger::AiOutcome => "ai_outcome",
            Trigger::PaymentReceived => "payment_received",
            Trigger::PaymentReceivedFull => "payment_received_full",
            Trigger::NewCallScheduled => "new_call_scheduled",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transition table
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One row of the table: from-state, to-state, and the triggers allowed to
/// drive that edge.
pub struct Rule {
    pub from: CallState,
    pub to: CallState,
    pub triggers: &'static [Trigger],
}

use CallState::*;
use Trigger::*;

pub const TRANSITION_TABLE: &[Rule] = &[
    // ── Pre-outcome ──────────────────────────────────────────────
    Rule { from: Unset, to: Canceled, triggers: &[CalendarCancel] },
    Rule { from: Unset, to: Rescheduled, triggers: &[CalendarMoved] },
    Rule { from: Unset, to: Show, triggers: &[TranscriptValid] },
    Rule { from: Unset, to: Ghosted, triggers: &[TranscriptEmpty] },
    Rule { from: Unset, to: Waiting, triggers: &[AppointmentTimePassed] },
    Rule { from: Unset, to: NoRecording, triggers: &[SystemFailure] },
    Rule { from: Unset, to: Overbooked, triggers: &[DoubleBooked] },
    Rule { from: Scheduled, to: Canceled, triggers: &[CalendarCancel] },
    Rule { from: Scheduled, to: Rescheduled, triggers: &[CalendarMoved] },
    Rule { from: Scheduled, to: Show, triggers: &[TranscriptValid] },
    Rule { from: Scheduled, to: Ghosted, triggers: &[TranscriptEmpty, TranscriptTimeout] },
    Rule { from: Scheduled, to: Waiting, triggers: &[AppointmentTimePassed] },
    Rule { from: Scheduled, to: NoRecording, triggers: &[SystemFailure] },
    Rule { from: Scheduled, to: Overbooked, triggers: &[DoubleBooked] },
    Rule { from: Waiting, to: Canceled, triggers: &[CalendarCancel] },
    Rule { from: Waiting, to: Show, triggers: &[TranscriptValid] },
    Rule { from: Waiting, to: Ghosted, triggers: &[TranscriptTimeout, TranscriptEmpty] },
    Rule { from: Waiting, to: NoRecording, triggers: &[SystemFailure] },
    Rule { from: Waiting, to: Overbooked, triggers: &[DoubleBooked] },
    // ── Recoverable non-shows ────────────────────────────────────
    Rule { from: NoRecording, to: Show, triggers: &[TranscriptValid, Reprocess] },
    Rule { from: NoRecording, to: Ghosted, triggers: &[TranscriptEmpty, TranscriptTimeout] },
    Rule { from: Ghosted, to: Show, triggers: &[Reprocess] },
    Rule { from: Ghosted, to: Overbooked, triggers: &[DoubleBooked] },
    Rule { from: Overbooked, to: Show, triggers: &[TranscriptValid, Reprocess] },
    Rule { from: Overbooked, to: Canceled, triggers: &[CalendarCancel] },
    Rule { from: Rescheduled, to: Canceled, triggers: &[CalendarCancel] },
    // ── Post-show outcomes ───────────────────────────────────────
    Rule { from: Show, to: ClosedWon, triggers: &[AiOutcome] },
    Rule { from: Show, to: Deposit, triggers: &[AiOutcome] },
    Rule { from: Show, to: FollowUp, triggers: &[AiOutcome] },
    Rule { from: Show, to: Lost, triggers: &[AiOutcome] },
    Rule { from: Show, to: Disqualified, triggers: &[AiOutcome] },
    Rule { from: Show, to: NotPitched, triggers: &[AiOutcome] },
    // ── Outcome revisions ────────────────────────────────────────
    Rule { from: FollowUp, to: ClosedWon, triggers: &[PaymentReceived] },
    Rule { from: FollowUp, to: NotPitched, triggers: &[NewCallScheduled] },
    Rule { from: NotPitched, to: ClosedWon, triggers: &[PaymentReceived] },
    Rule { from: NotPitched, to: FollowUp, triggers: &[NewCallScheduled] },
    Rule { from: Lost, to: ClosedWon, triggers: &[PaymentReceived] },
    Rule { from: Lost, to: FollowUp, triggers: &[NewCallScheduled] },
    Rule { from: Deposit, to: ClosedWon, triggers: &[PaymentReceivedFull] },
];

/// Triggers allowed on the `(from, to)` edge, empty when the edge does not
/// exist.
pub fn allowed_triggers(from: CallState, to: CallState) -> &'static [Trigger] {
    TRANSITION_TABLE
        .iter()
        .find(|r| r.from == from && r.to == to)
        .map(|r| r.triggers)
        .unwrap_or(&[])
}

/// Whether `(from, to, trigger)` appears in the table.
pub fn is_valid(from: CallState, to: CallState, trigger: Trigger) -> bool {
    allowed_triggers(from, to).contains(&trigger)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_edges_exist() {
        assert!(is_valid(Unset, Show, TranscriptValid));
        assert!(is_valid(Unset, Waiting, AppointmentTimePassed));
        assert!(is_valid(Waiting, Ghosted, TranscriptTimeout));
        assert!(is_valid(Show, FollowUp, AiOutcome));
        assert!(is_valid(FollowUp, ClosedWon, PaymentReceived));
        assert!(is_valid(Deposit, ClosedWon, PaymentReceivedFull));
    }

    #[test]
    fn unset_has_no_timeout_ghost_edge() {
        // transcript_timeout ghosts only from Scheduled or Waiting.
        assert!(!is_valid(Unset, Ghosted, TranscriptTimeout));
        assert!(is_valid(Scheduled, Ghosted, TranscriptTimeout));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for rule in TRANSITION_TABLE {
            assert!(
                !rule.from.is_terminal(),
                "terminal state {} has an outgoing edge",
                rule.from
            );
        }
    }

    #[test]
    fn payment_cannot_close_a_show_directly() {
        assert!(!is_valid(Show, ClosedWon, PaymentReceived));
        assert!(is_valid(Show, ClosedWon, AiOutcome));
    }

    #[test]
    fn deposit_requires_full_payment_trigger() {
        assert!(!is_valid(Deposit, ClosedWon, PaymentReceived));
        assert!(is_valid(Deposit, ClosedWon, PaymentReceivedFull));
    }

    #[test]
    fn ghosted_recovers_only_via_reprocess() {
        assert!(is_valid(Ghosted, Show, Reprocess));
        assert!(!is_valid(Ghosted, Show, TranscriptValid));
    }

    #[test]
    fn wrong_trigger_on_valid_edge_is_invalid() {
        assert!(!is_valid(Unset, Canceled, CalendarMoved));
        assert!(!is_valid(Waiting, Show, Reprocess));
    }
}
