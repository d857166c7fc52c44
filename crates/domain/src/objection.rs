//! Objections raised on a call, as classified by analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::taxonomy::ObjectionType;

/// One objection raised during a call. Tenant and closer are denormalized so
/// dashboard queries never join through the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objection {
    pub id: String,
    pub call_id: String,
    pub tenant_id: String,
    pub closer_id: String,
    pub objection_type: ObjectionType,
    /// The prospect's actual phrase, verbatim from the transcript.
    pub prospect_phrase: String,
    /// Offset from call start, in seconds.
    pub seconds_into_call: Option<u32>,
    pub resolved: bool,
    pub resolution_text: Option<String>,
    pub resolution_seconds: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Objection {
    pub fn new(
        call_id: &str,
        tenant_id: &str,
        closer_id: &str,
        objection_type: ObjectionType,
        prospect_phrase: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            call_id: call_id.to_string(),
            tenant_id: tenant_id.to_string(),
            closer_id: closer_id.to_string(),
            objection_type,
            prospect_phrase: prospect_phrase.to_string(),
            seconds_into_call: None,
            resolved: false,
            resolution_text: None,
            resolution_seconds: None,
            created_at: Utc::now(),
        }
    }
}
