//! Append-only audit trail and AI cost entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Audit entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    StateChange,
    Error,
    PaymentClose,
    PaymentReceived,
}

/// What caused a write. Carried on every audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    CalendarWebhook,
    TranscriptWebhook,
    PaymentWebhook,
    AiProcessing,
    Timeout,
    Admin,
    System,
}

/// One append-only audit row. Never updated or deleted; write failures are
/// logged and swallowed so auditing can never fail the operation it records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action: AuditAction,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub trigger_source: TriggerSource,
    pub trigger_detail: Option<String>,
    pub metadata: serde_json::Value,
}

impl AuditEntry {
    pub fn new(
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
        action: AuditAction,
        source: TriggerSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            tenant_id: tenant_id.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action,
            field: None,
            old_value: None,
            new_value: None,
            trigger_source: source,
            trigger_detail: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_change(mut self, field: &str, old: &str, new: &str) -> Self {
        self.field = Some(field.to_string());
        self.old_value = Some(old.to_string());
        self.new_value = Some(new.to_string());
        self
    }

    pub fn with_detail(mut self, detail: &str) -> Self {
        self.trigger_detail = Some(detail.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cost entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One row per AI invocation, computed from the model's reported token
/// counts and the configured per-million rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub tenant_id: String,
    pub call_id: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub total_cost_usd: f64,
    pub duration_ms: u64,
}

impl CostEntry {
    /// Price an invocation. Rates are USD per million tokens.
    pub fn priced(
        tenant_id: &str,
        call_id: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        rate_in_per_million: f64,
        rate_out_per_million: f64,
        duration_ms: u64,
    ) -> Self {
        let input_cost_usd = input_tokens as f64 * rate_in_per_million / 1_000_000.0;
        let output_cost_usd = output_tokens as f64 * rate_out_per_million / 1_000_000.0;
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            tenant_id: tenant_id.to_string(),
            call_id: call_id.to_string(),
            model: model.to_string(),
            input_tokens,
            output_tokens,
            input_cost_usd,
            output_cost_usd,
            total_cost_usd: input_cost_usd + output_cost_usd,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_pricing_formula() {
        let e = CostEntry::priced("t1", "call1", "claude-sonnet-4", 10_000, 2_000, 3.0, 15.0, 900);
        assert!((e.input_cost_usd - 0.03).abs() < 1e-9);
        assert!((e.output_cost_usd - 0.03).abs() < 1e-9);
        assert!((e.total_cost_usd - 0.06).abs() < 1e-9);
    }

    #[test]
    fn audit_builder_sets_change_fields() {
        let e = AuditEntry::new("t1", "call", "c1", AuditAction::StateChange, TriggerSource::Timeout)
            .with_change("attendance", "unset", "Waiting for Outcome")
            .with_detail("appointment_time_passed");
        assert_eq!(e.field.as_deref(), Some("attendance"));
        assert_eq!(e.old_value.as_deref(), Some("unset"));
        assert_eq!(e.new_value.as_deref(), Some("Waiting for Outcome"));
        assert_eq!(e.trigger_detail.as_deref(), Some("appointment_time_passed"));
    }
}
