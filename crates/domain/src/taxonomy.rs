//! Closed taxonomies: lifecycle states, outcomes, call types, objection
//! types, and the scoring rubric.
//!
//! These sets are configuration data. The descriptions feed both the AI
//! prompt assembly and dashboard rendering, so wording changes here change
//! model behavior.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Call lifecycle states
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The attendance value stored on a call. `Unset` is the freshly-created
/// state before any transition has fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CallState {
    #[default]
    #[serde(rename = "unset")]
    Unset,
    #[serde(rename = "Scheduled")]
    Scheduled,
    #[serde(rename = "Waiting for Outcome")]
    Waiting,
    #[serde(rename = "Show")]
    Show,
    #[serde(rename = "Ghosted - No Show")]
    Ghosted,
    #[serde(rename = "No Recording")]
    NoRecording,
    #[serde(rename = "Canceled")]
    Canceled,
    #[serde(rename = "Rescheduled")]
    Rescheduled,
    #[serde(rename = "Overbooked")]
    Overbooked,
    #[serde(rename = "Closed - Won")]
    ClosedWon,
    #[serde(rename = "Deposit")]
    Deposit,
    #[serde(rename = "Follow Up")]
    FollowUp,
    #[serde(rename = "Lost")]
    Lost,
    #[serde(rename = "Disqualified")]
    Disqualified,
    #[serde(rename = "Not Pitched")]
    NotPitched,
}

impl CallState {
    pub fn label(&self) -> &'static str {
        match self {
            CallState::Unset => "unset",
            CallState::Scheduled => "Scheduled",
            CallState::Waiting => "Waiting for Outcome",
            CallState::Show => "Show",
            CallState::Ghosted => "Ghosted - No Show",
            CallState::NoRecording => "No Recording",
            CallState::Canceled => "Canceled",
            CallState::Rescheduled => "Rescheduled",
            CallState::Overbooked => "Overbooked",
            CallState::ClosedWon => "Closed - Won",
            CallState::Deposit => "Deposit",
            CallState::FollowUp => "Follow Up",
            CallState::Lost => "Lost",
            CallState::Disqualified => "Disqualified",
            CallState::NotPitched => "Not Pitched",
        }
    }

    /// States a calendar update may still mutate in place.
    pub fn is_pre_outcome(&self) -> bool {
        matches!(
            self,
            CallState::Unset | CallState::Scheduled | CallState::Waiting
        )
    }

    /// The call happened and carries (or will carry) an outcome.
    pub fn is_conversational(&self) -> bool {
        matches!(
            self,
            CallState::Show
                | CallState::ClosedWon
                | CallState::Deposit
                | CallState::FollowUp
                | CallState::Lost
                | CallState::Disqualified
                | CallState::NotPitched
        )
    }

    /// Carries a call outcome. Show is conversational but not yet an
    /// outcome state.
    pub fn is_outcome_state(&self) -> bool {
        self.is_conversational() && *self != CallState::Show
    }

    /// No transition leaves these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Canceled | CallState::ClosedWon)
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Call outcomes (AI-produced)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The outcome the analysis (or a payment) assigns to a held call. Stored
/// in the same attendance field once terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallOutcome {
    #[serde(rename = "Closed - Won")]
    ClosedWon,
    #[serde(rename = "Deposit")]
    Deposit,
    #[serde(rename = "Follow Up")]
    FollowUp,
    #[serde(rename = "Lost")]
    Lost,
    #[serde(rename = "Disqualified")]
    Disqualified,
    #[serde(rename = "Not Pitched")]
    NotPitched,
}

pub const ALL_OUTCOMES: &[CallOutcome] = &[
    CallOutcome::ClosedWon,
    CallOutcome::Deposit,
    CallOutcome::FollowUp,
    CallOutcome::Lost,
    CallOutcome::Disqualified,
    CallOutcome::NotPitched,
];

impl CallOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CallOutcome::ClosedWon => "Closed - Won",
            CallOutcome::Deposit => "Deposit",
            CallOutcome::FollowUp => "Follow Up",
            CallOutcome::Lost => "Lost",
            CallOutcome::Disqualified => "Disqualified",
            CallOutcome::NotPitched => "Not Pitched",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CallOutcome::ClosedWon => {
                "The prospect committed and paid (or signed) on the call."
            }
            CallOutcome::Deposit => {
                "The prospect paid a partial deposit with the balance outstanding."
            }
            CallOutcome::FollowUp => {
                "A real conversation happened and another call was or will be scheduled."
            }
            CallOutcome::Lost => {
                "The prospect was pitched and declined, with no follow-up planned."
            }
            CallOutcome::Disqualified => {
                "The prospect does not meet the offer's qualification criteria."
            }
            CallOutcome::NotPitched => {
                "The conversation never reached a pitch (discovery only, wrong fit call, etc.)."
            }
        }
    }

    /// The attendance value this outcome persists as.
    pub fn as_state(&self) -> CallState {
        match self {
            CallOutcome::ClosedWon => CallState::ClosedWon,
            CallOutcome::Deposit => CallState::Deposit,
            CallOutcome::FollowUp => CallState::FollowUp,
            CallOutcome::Lost => CallState::Lost,
            CallOutcome::Disqualified => CallState::Disqualified,
            CallOutcome::NotPitched => CallState::NotPitched,
        }
    }

    /// The outcome an attendance value implies, for the six outcome states.
    pub fn from_state(state: CallState) -> Option<CallOutcome> {
        match state {
            CallState::ClosedWon => Some(CallOutcome::ClosedWon),
            CallState::Deposit => Some(CallOutcome::Deposit),
            CallState::FollowUp => Some(CallOutcome::FollowUp),
            CallState::Lost => Some(CallOutcome::Lost),
            CallState::Disqualified => Some(CallOutcome::Disqualified),
            CallState::NotPitched => Some(CallOutcome::NotPitched),
            _ => None,
        }
    }

    /// Resolve a model-produced outcome string against the closed set.
    /// Case-insensitive, tolerant of separator noise ("closed_won").
    pub fn match_label(s: &str) -> Option<CallOutcome> {
        let needle = normalize_key(s);
        ALL_OUTCOMES
            .iter()
            .find(|o| normalize_key(o.label()) == needle)
            .copied()
    }
}

impl std::fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Call types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallType {
    #[default]
    #[serde(rename = "First Call")]
    FirstCall,
    #[serde(rename = "Follow Up")]
    FollowUp,
    #[serde(rename = "Rescheduled First Call")]
    RescheduledFirstCall,
    #[serde(rename = "Rescheduled Follow Up")]
    RescheduledFollowUp,
}

impl CallType {
    pub fn label(&self) -> &'static str {
        match self {
            CallType::FirstCall => "First Call",
            CallType::FollowUp => "Follow Up",
            CallType::RescheduledFirstCall => "Rescheduled First Call",
            CallType::RescheduledFollowUp => "Rescheduled Follow Up",
        }
    }

    /// The variant this type becomes when the event's start time moves
    /// before the call is held.
    pub fn as_rescheduled(&self) -> CallType {
        match self {
            CallType::FirstCall | CallType::RescheduledFirstCall => {
                CallType::RescheduledFirstCall
            }
            CallType::FollowUp | CallType::RescheduledFollowUp => CallType::RescheduledFollowUp,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Processing state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where a call sits in the AI analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    #[default]
    Pending,
    Queued,
    Processing,
    Complete,
    Error,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Objection taxonomy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectionType {
    #[serde(rename = "Financial")]
    Financial,
    #[serde(rename = "Spouse/Partner")]
    SpousePartner,
    #[serde(rename = "Think About It")]
    ThinkAboutIt,
    #[serde(rename = "Timing")]
    Timing,
    #[serde(rename = "Trust/Credibility")]
    TrustCredibility,
    #[serde(rename = "Already Tried")]
    AlreadyTried,
    #[serde(rename = "DIY")]
    Diy,
    #[serde(rename = "Not Ready")]
    NotReady,
    #[serde(rename = "Competitor")]
    Competitor,
    #[serde(rename = "Authority")]
    Authority,
    #[serde(rename = "Value")]
    Value,
    #[serde(rename = "Commitment")]
    Commitment,
    #[serde(rename = "Other")]
    Other,
}

pub const ALL_OBJECTION_TYPES: &[ObjectionType] = &[
    ObjectionType::Financial,
    ObjectionType::SpousePartner,
    ObjectionType::ThinkAboutIt,
    ObjectionType::Timing,
    ObjectionType::TrustCredibility,
    ObjectionType::AlreadyTried,
    ObjectionType::Diy,
    ObjectionType::NotReady,
    ObjectionType::Competitor,
    ObjectionType::Authority,
    ObjectionType::Value,
    ObjectionType::Commitment,
    ObjectionType::Other,
];

impl ObjectionType {
    pub fn label(&self) -> &'static str {
        match self {
            ObjectionType::Financial => "Financial",
            ObjectionType::SpousePartner => "Spouse/Partner",
            ObjectionType::ThinkAboutIt => "Think About It",
            ObjectionType::Timing => "Timing",
            ObjectionType::TrustCredibility => "Trust/Credibility",
            ObjectionType::AlreadyTried => "Already Tried",
            ObjectionType::Diy => "DIY",
            ObjectionType::NotReady => "Not Ready",
            ObjectionType::Competitor => "Competitor",
            ObjectionType::Authority => "Authority",
            ObjectionType::Value => "Value",
            ObjectionType::Commitment => "Commitment",
            ObjectionType::Other => "Other",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ObjectionType::Financial => {
                "Cannot afford it, needs financing, or objects to the price itself."
            }
            ObjectionType::SpousePartner => {
                "Needs to consult a spouse or partner before committing."
            }
            ObjectionType::ThinkAboutIt => {
                "Wants time to think it over without a concrete blocker."
            }
            ObjectionType::Timing => "Now is not the right time (season, workload, life event).",
            ObjectionType::TrustCredibility => {
                "Doubts the company, the closer, or the results being claimed."
            }
            ObjectionType::AlreadyTried => {
                "Tried a similar program or service before and it did not work."
            }
            ObjectionType::Diy => "Believes they can achieve the result on their own.",
            ObjectionType::NotReady => "Interested but does not feel ready to start.",
            ObjectionType::Competitor => "Considering or already talking to a competitor.",
            ObjectionType::Authority => {
                "Lacks the authority to decide (partner, board, manager)."
            }
            ObjectionType::Value => {
                "Unconvinced the outcome justifies the investment."
            }
            ObjectionType::Commitment => {
                "Hesitant about the time or effort the program requires."
            }
            ObjectionType::Other => "Any objection that fits no other category.",
        }
    }

    /// Resolve a model-produced objection type against the closed set.
    /// Matches the display label or a snake-ish key, case-insensitively.
    /// Returns `None` when nothing matches; the caller decides the fallback.
    pub fn match_label(s: &str) -> Option<ObjectionType> {
        let needle = normalize_key(s);
        if needle.is_empty() {
            return None;
        }
        ALL_OBJECTION_TYPES
            .iter()
            .find(|t| normalize_key(t.label()) == needle)
            .copied()
    }
}

/// Collapse case and separator differences: "Spouse/Partner",
/// "spouse_partner" and "spouse partner" all normalize to "spousepartner".
fn normalize_key(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scoring rubric
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const SCORE_MIN: u8 = 1;
pub const SCORE_MAX: u8 = 10;
/// Midpoint default when the model omits a numeric score.
pub const SCORE_NEUTRAL: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreDimension {
    Discovery,
    Pitch,
    CloseAttempt,
    ObjectionHandling,
    Overall,
    ScriptAdherence,
    ProspectFit,
}

pub const ALL_SCORE_DIMENSIONS: &[ScoreDimension] = &[
    ScoreDimension::Discovery,
    ScoreDimension::Pitch,
    ScoreDimension::CloseAttempt,
    ScoreDimension::ObjectionHandling,
    ScoreDimension::Overall,
    ScoreDimension::ScriptAdherence,
    ScoreDimension::ProspectFit,
];

impl ScoreDimension {
    pub fn label(&self) -> &'static str {
        match self {
            ScoreDimension::Discovery => "Discovery",
            ScoreDimension::Pitch => "Pitch",
            ScoreDimension::CloseAttempt => "Close Attempt",
            ScoreDimension::ObjectionHandling => "Objection Handling",
            ScoreDimension::Overall => "Overall",
            ScoreDimension::ScriptAdherence => "Script Adherence",
            ScoreDimension::ProspectFit => "Prospect Fit",
        }
    }

    /// JSON field name in the model's output schema.
    pub fn field(&self) -> &'static str {
        match self {
            ScoreDimension::Discovery => "discovery_score",
            ScoreDimension::Pitch => "pitch_score",
            ScoreDimension::CloseAttempt => "close_attempt_score",
            ScoreDimension::ObjectionHandling => "objection_handling_score",
            ScoreDimension::Overall => "overall_score",
            ScoreDimension::ScriptAdherence => "script_adherence_score",
            ScoreDimension::ProspectFit => "prospect_fit_score",
        }
    }
}

/// The 1-10 band descriptions shared by every dimension.
pub const SCORE_BANDS: &[(&str, &str)] = &[
    ("1-3", "Poor — the skill was absent or actively hurt the call"),
    ("4-5", "Below Average — attempted but weak or incomplete"),
    ("6-7", "Average — competent, no standout strengths or gaps"),
    ("8-9", "Good — strong, consistent execution"),
    ("10", "Exceptional — textbook execution under real conditions"),
];

/// Clamp a raw model score into the configured range.
pub fn clamp_score(raw: i64) -> u8 {
    raw.clamp(SCORE_MIN as i64, SCORE_MAX as i64) as u8
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Payments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Full,
    Deposit,
    PaymentPlan,
    Refund,
    Chargeback,
}

impl PaymentType {
    pub fn key(&self) -> &'static str {
        match self {
            PaymentType::Full => "full",
            PaymentType::Deposit => "deposit",
            PaymentType::PaymentPlan => "payment_plan",
            PaymentType::Refund => "refund",
            PaymentType::Chargeback => "chargeback",
        }
    }

    pub fn is_reversal(&self) -> bool {
        matches!(self, PaymentType::Refund | PaymentType::Chargeback)
    }

    /// Human label written to the call's payment_plan field on a close.
    pub fn plan_label(&self) -> &'static str {
        match self {
            PaymentType::Full => "Full",
            PaymentType::Deposit => "Deposit",
            PaymentType::PaymentPlan => "Payment Plan",
            PaymentType::Refund | PaymentType::Chargeback => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_label_round_trip() {
        for o in ALL_OUTCOMES {
            assert_eq!(CallOutcome::match_label(o.label()), Some(*o));
        }
    }

    #[test]
    fn outcome_match_is_case_and_separator_insensitive() {
        assert_eq!(
            CallOutcome::match_label("closed - won"),
            Some(CallOutcome::ClosedWon)
        );
        assert_eq!(
            CallOutcome::match_label("CLOSED_WON"),
            Some(CallOutcome::ClosedWon)
        );
        assert_eq!(CallOutcome::match_label("not pitched"), Some(CallOutcome::NotPitched));
        assert_eq!(CallOutcome::match_label("imaginary"), None);
    }

    #[test]
    fn objection_match_accepts_label_or_key() {
        assert_eq!(
            ObjectionType::match_label("Spouse/Partner"),
            Some(ObjectionType::SpousePartner)
        );
        assert_eq!(
            ObjectionType::match_label("spouse_partner"),
            Some(ObjectionType::SpousePartner)
        );
        assert_eq!(ObjectionType::match_label("diy"), Some(ObjectionType::Diy));
        assert_eq!(ObjectionType::match_label("think about it"), Some(ObjectionType::ThinkAboutIt));
        assert_eq!(ObjectionType::match_label("telepathy"), None);
    }

    #[test]
    fn thirteen_objection_types() {
        assert_eq!(ALL_OBJECTION_TYPES.len(), 13);
    }

    #[test]
    fn score_clamping() {
        assert_eq!(clamp_score(0), 1);
        assert_eq!(clamp_score(7), 7);
        assert_eq!(clamp_score(14), 10);
        assert_eq!(clamp_score(-3), 1);
    }

    #[test]
    fn pre_outcome_set() {
        assert!(CallState::Unset.is_pre_outcome());
        assert!(CallState::Scheduled.is_pre_outcome());
        assert!(CallState::Waiting.is_pre_outcome());
        assert!(!CallState::Show.is_pre_outcome());
        assert!(!CallState::Ghosted.is_pre_outcome());
    }

    #[test]
    fn outcome_states_exclude_show() {
        assert!(CallState::Show.is_conversational());
        assert!(!CallState::Show.is_outcome_state());
        assert!(CallState::FollowUp.is_outcome_state());
        assert!(CallState::ClosedWon.is_outcome_state());
    }

    #[test]
    fn state_labels_serialize_to_legacy_strings() {
        let json = serde_json::to_string(&CallState::Ghosted).unwrap();
        assert_eq!(json, "\"Ghosted - No Show\"");
        let back: CallState = serde_json::from_str("\"Closed - Won\"").unwrap();
        assert_eq!(back, CallState::ClosedWon);
    }
}
