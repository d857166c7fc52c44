//! Prompt assembly.
//!
//! Nothing here is hard-coded to a tenant: the system prompt is built from
//! the global taxonomy plus whichever tenant sections are non-empty, and
//! the user message carries the call metadata and transcript.

use cs_domain::call::Call;
use cs_domain::taxonomy::{
    ALL_OBJECTION_TYPES, ALL_OUTCOMES, ALL_SCORE_DIMENSIONS, SCORE_BANDS,
};
use cs_domain::tenant::Tenant;

/// Assemble the system prompt for a tenant.
pub fn system_prompt(tenant: &Tenant) -> String {
    let mut out = String::with_capacity(4096);

    out.push_str(
        "You are a sales-call analyst. You receive the transcript of a sales \
         call and return a strict JSON assessment. Use only the closed \
         taxonomies below; never invent outcome or objection values.\n",
    );

    out.push_str("\n## Call outcomes\n");
    for outcome in ALL_OUTCOMES {
        out.push_str(&format!("- \"{}\": {}\n", outcome.label(), outcome.description()));
    }

    out.push_str("\n## Objection types\n");
    for t in ALL_OBJECTION_TYPES {
        out.push_str(&format!("- \"{}\": {}\n", t.label(), t.description()));
    }

    out.push_str("\n## Scoring\nScore each dimension from 1 to 10:\n");
    for d in ALL_SCORE_DIMENSIONS {
        out.push_str(&format!("- {} (`{}`)\n", d.label(), d.field()));
    }
    out.push_str("Bands:\n");
    for (range, description) in SCORE_BANDS {
        out.push_str(&format!("- {range}: {description}\n"));
    }

    out.push_str(&format!(
        "\n## Output format\nRespond with a single JSON object, no prose, \
         no code fences:\n{{\n  \"call_outcome\": one of [{}],\n{}  \
         \"prospect_temperature\": \"hot\" | \"warm\" | \"cold\",\n  \
         \"goals\": string,\n  \"pains\": string,\n  \"situation\": string,\n  \
         \"summary\": string,\n  \"coaching_feedback\": string,\n  \
         \"objections\": [{{\"objection_type\": one of [{}], \
         \"prospect_phrase\": string, \"seconds_into_call\": number, \
         \"resolved\": boolean, \"resolution_text\": string}}]\n}}\n",
        ALL_OUTCOMES
            .iter()
            .map(|o| format!("\"{}\"", o.label()))
            .collect::<Vec<_>>()
            .join(", "),
        ALL_SCORE_DIMENSIONS
            .iter()
            .map(|d| format!("  \"{}\": 1-10,\n", d.field()))
            .collect::<String>(),
        ALL_OBJECTION_TYPES
            .iter()
            .map(|t| format!("\"{}\"", t.label()))
            .collect::<Vec<_>>()
            .join(", "),
    ));

    // Tenant sections, each included only when non-empty.
    let sections: &[(&str, &Option<String>)] = &[
        ("Business context", &tenant.prompts.business_context),
        ("Offer and price", &tenant.prompts.offer_description),
        ("Script template", &tenant.prompts.script_template),
        ("Discovery scoring guidance", &tenant.prompts.scoring_discovery),
        ("Pitch scoring guidance", &tenant.prompts.scoring_pitch),
        ("Close scoring guidance", &tenant.prompts.scoring_close),
        (
            "Objection-handling scoring guidance",
            &tenant.prompts.scoring_objections,
        ),
        (
            "Disqualification criteria",
            &tenant.prompts.disqualification_criteria,
        ),
        ("Known common objections", &tenant.prompts.common_objections),
        ("Additional context", &tenant.prompts.additional_context),
    ];
    for (heading, body) in sections {
        if let Some(text) = body {
            if !text.trim().is_empty() {
                out.push_str(&format!("\n## {heading}\n{}\n", text.trim()));
            }
        }
    }

    out
}

/// Assemble the user message: call metadata plus the flattened transcript.
pub fn user_message(call: &Call, closer_name: &str, transcript_text: &str) -> String {
    let duration = call
        .duration_minutes
        .map(|m| format!("{m} minutes"))
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "Call type: {}\nCloser: {}\nDuration: {}\n\nTranscript:\n{}",
        call.call_type.label(),
        closer_name,
        duration,
        transcript_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tenant_sections_are_omitted() {
        let tenant = Tenant::new("bare");
        let prompt = system_prompt(&tenant);
        assert!(!prompt.contains("## Business context"));
        assert!(!prompt.contains("## Script template"));
        // Taxonomy is always present.
        assert!(prompt.contains("\"Closed - Won\""));
        assert!(prompt.contains("\"Spouse/Partner\""));
        assert!(prompt.contains("overall_score"));
    }

    #[test]
    fn populated_tenant_sections_are_included() {
        let mut tenant = Tenant::new("rich");
        tenant.prompts.business_context = Some("We sell coaching.".into());
        tenant.prompts.disqualification_criteria = Some("Under $1k budget.".into());
        tenant.prompts.scoring_pitch = Some("  ".into());
        let prompt = system_prompt(&tenant);
        assert!(prompt.contains("## Business context\nWe sell coaching."));
        assert!(prompt.contains("## Disqualification criteria"));
        assert!(!prompt.contains("## Pitch scoring guidance"), "blank section omitted");
    }

    #[test]
    fn user_message_carries_metadata_and_transcript() {
        let mut call = Call::new("t1", "c1", "evt", "2026-02-20T20:00:00Z", None, "UTC");
        call.duration_minutes = Some(48);
        let msg = user_message(&call, "Sarah Lane", "00:00:01 - Sarah Lane: Hi");
        assert!(msg.contains("Call type: First Call"));
        assert!(msg.contains("Closer: Sarah Lane"));
        assert!(msg.contains("Duration: 48 minutes"));
        assert!(msg.ends_with("00:00:01 - Sarah Lane: Hi"));
    }
}
