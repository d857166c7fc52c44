//! Prospect aggregates, keyed on (tenant, email).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rolling per-prospect aggregate maintained by the payment pipeline (and
/// optionally by attendance ingestion). One row per (tenant, email).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prospect {
    pub id: String,
    pub tenant_id: String,
    pub email: String,
    pub name: Option<String>,
    pub total_calls: u32,
    pub total_shows: u32,
    pub total_cash_collected: f64,
    pub total_revenue: f64,
    pub payment_count: u32,
    pub last_payment_date: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prospect {
    pub fn new(tenant_id: &str, email: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            email: crate::tenant::normalize_email(email),
            name: None,
            total_calls: 0,
            total_shows: 0,
            total_cash_collected: 0.0,
            total_revenue: 0.0,
            payment_count: 0,
            last_payment_date: None,
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}
