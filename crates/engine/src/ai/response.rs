//! Model response validation.
//!
//! Fuzzy where safe, strict where it matters: scores clamp and default,
//! objection types fall back to Other, but an unmappable call outcome fails
//! the parse; the caller records the error and the call stays in Show.

use serde_json::Value;

use cs_domain::call::Scores;
use cs_domain::error::{Error, Result};
use cs_domain::taxonomy::{clamp_score, CallOutcome, ObjectionType, SCORE_NEUTRAL};

#[derive(Debug, Clone)]
pub struct ParsedObjection {
    pub objection_type: ObjectionType,
    pub prospect_phrase: String,
    pub seconds_into_call: Option<u32>,
    pub resolved: bool,
    pub resolution_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedAnalysis {
    pub outcome: CallOutcome,
    pub scores: Scores,
    pub prospect_temperature: Option<String>,
    pub goals: Option<String>,
    pub pains: Option<String>,
    pub situation: Option<String>,
    pub summary: Option<String>,
    pub coaching_feedback: Option<String>,
    pub objections: Vec<ParsedObjection>,
}

/// Strip an optional Markdown code-fence wrapper.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line.
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches(['\r', '\n'])
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

fn score(raw: &Value, field: &str) -> u8 {
    raw.get(field)
        .and_then(Value::as_i64)
        .map(clamp_score)
        .unwrap_or(SCORE_NEUTRAL)
}

fn text(raw: &Value, field: &str) -> Option<String> {
    raw.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse and validate a model response against the closed taxonomies.
pub fn parse_response(content: &str) -> Result<ParsedAnalysis> {
    let stripped = strip_code_fences(content);
    let raw: Value = serde_json::from_str(stripped)
        .map_err(|e| Error::Validation(format!("analysis response is not JSON: {e}")))?;

    let outcome_raw = raw
        .get("call_outcome")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation("analysis response has no call_outcome".into()))?;
    let outcome = CallOutcome::match_label(outcome_raw).ok_or_else(|| {
        Error::Validation(format!("call_outcome '{outcome_raw}' is outside the taxonomy"))
    })?;

    let scores = Scores {
        discovery: Some(score(&raw, "discovery_score")),
        pitch: Some(score(&raw, "pitch_score")),
        close_attempt: Some(score(&raw, "close_attempt_score")),
        objection_handling: Some(score(&raw, "objection_handling_score")),
        overall: Some(score(&raw, "overall_score")),
        script_adherence: Some(score(&raw, "script_adherence_score")),
        prospect_fit: Some(score(&raw, "prospect_fit_score")),
    };

    let objections = raw
        .get("objections")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|o| {
                    let phrase = text(o, "prospect_phrase")?;
                    let type_raw = o
                        .get("objection_type")
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    // Off-taxonomy types degrade to Other rather than
                    // dropping the objection.
                    let objection_type =
                        ObjectionType::match_label(type_raw).unwrap_or(ObjectionType::Other);
                    Some(ParsedObjection {
                        objection_type,
                        prospect_phrase: phrase,
                        seconds_into_call: o
                            .get("seconds_into_call")
                            .and_then(Value::as_u64)
                            .map(|s| s as u32),
                        resolved: o.get("resolved").and_then(Value::as_bool).unwrap_or(false),
                        resolution_text: text(o, "resolution_text"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ParsedAnalysis {
        outcome,
        scores,
        prospect_temperature: text(&raw, "prospect_temperature"),
        goals: text(&raw, "goals"),
        pains: text(&raw, "pains"),
        situation: text(&raw, "situation"),
        summary: text(&raw, "summary"),
        coaching_feedback: text(&raw, "coaching_feedback"),
        objections,
    })
}
