//! Tenants (customer organizations) and closers (their salespeople).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tenant
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Basic,
    Insight,
    Executive,
}

/// Per-section prompt fragments a tenant supplies for analysis. Every field
/// is optional; empty sections are omitted from the assembled prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantPrompts {
    #[serde(default)]
    pub business_context: Option<String>,
    #[serde(default)]
    pub offer_description: Option<String>,
    #[serde(default)]
    pub script_template: Option<String>,
    #[serde(default)]
    pub scoring_discovery: Option<String>,
    #[serde(default)]
    pub scoring_pitch: Option<String>,
    #[serde(default)]
    pub scoring_close: Option<String>,
    #[serde(default)]
    pub scoring_objections: Option<String>,
    #[serde(default)]
    pub disqualification_criteria: Option<String>,
    #[serde(default)]
    pub common_objections: Option<String>,
    #[serde(default)]
    pub additional_context: Option<String>,
}

/// A customer organization. Never deleted, only deactivated; every persisted
/// row in every table belongs to exactly one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub display_name: String,
    pub plan_tier: PlanTier,
    /// Ordered case-insensitive substrings distinguishing sales calls from
    /// other calendar events. The wildcard "*" accepts every title.
    pub filter_phrases: Vec<String>,
    pub prompts: TenantPrompts,
    pub default_transcript_provider: String,
    /// Opaque secret the payment webhook must present as a bearer token.
    pub webhook_secret: String,
    pub timezone: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(display_name: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            plan_tier: PlanTier::Basic,
            filter_phrases: vec!["*".to_string()],
            prompts: TenantPrompts::default(),
            default_transcript_provider: "fathom".to_string(),
            webhook_secret: generate_secret(),
            timezone: "UTC".to_string(),
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Whether an event title passes this tenant's filter phrases.
    pub fn title_matches_filters(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.filter_phrases.iter().any(|phrase| {
            phrase == "*" || (!phrase.is_empty() && title.contains(&phrase.to_lowercase()))
        })
    }
}

/// Opaque long random identifier. Two v4 UUIDs stripped of dashes give 64
/// hex chars of entropy without another dependency.
pub fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Closer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloserStatus {
    #[default]
    Active,
    Inactive,
}

/// A salesperson belonging to exactly one tenant. The work email is the join
/// key for calendar and transcript correlation: unique within (tenant,
/// active). A person working for two tenants exists as two closers with
/// distinct work emails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Closer {
    pub id: String,
    pub tenant_id: String,
    pub display_name: String,
    pub work_email: String,
    pub transcript_provider: Option<String>,
    /// Opaque credential for the transcript provider's API (pull + webhook
    /// registration). Never logged.
    pub transcript_credential: Option<String>,
    pub provider_webhook_id: Option<String>,
    pub provider_webhook_secret: Option<String>,
    pub status: CloserStatus,
    pub created_at: DateTime<Utc>,
}

impl Closer {
    pub fn new(tenant_id: &str, display_name: &str, work_email: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            display_name: display_name.to_string(),
            work_email: normalize_email(work_email),
            transcript_provider: None,
            transcript_credential: None,
            provider_webhook_id: None,
            provider_webhook_secret: None,
            status: CloserStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CloserStatus::Active
    }

    /// First word of the display name, used by title scrubbing.
    pub fn first_name(&self) -> &str {
        self.display_name.split_whitespace().next().unwrap_or("")
    }
}

/// Email comparison policy: lowercase + trim at every ingestion boundary,
/// exact string equality thereafter.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_phrases_are_case_insensitive_substrings() {
        let mut t = Tenant::new("Friends Inc");
        t.filter_phrases = vec!["strategy".into(), "intro call".into()];
        assert!(t.title_matches_filters("Strategy Call with John Smith"));
        assert!(t.title_matches_filters("INTRO CALL — jane"));
        assert!(!t.title_matches_filters("Dentist appointment"));
    }

    #[test]
    fn wildcard_matches_everything() {
        let t = Tenant::new("Friends Inc");
        assert!(t.title_matches_filters("Dentist appointment"));
        assert!(t.title_matches_filters(""));
    }

    #[test]
    fn emails_normalize_to_lowercase() {
        assert_eq!(normalize_email("  Sarah@X.COM "), "sarah@x.com");
        let c = Closer::new("t1", "Sarah Lane", "Sarah@X.com");
        assert_eq!(c.work_email, "sarah@x.com");
    }

    #[test]
    fn generated_secrets_are_long_and_distinct() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }
}
