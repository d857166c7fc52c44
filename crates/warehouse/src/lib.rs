//! Warehouse gateway — the sole access point to persistent storage.
//!
//! Every read and mutation method requires a tenant identifier as an
//! explicit parameter; the only cross-tenant spans are the separately named
//! `*_all_tenants` methods, which exist for the admin-scoped lookups the
//! engine genuinely needs (transcript tenant resolution, the sweeper batch
//! job). Values are always bound, never interpolated, and inserts are
//! immediately consistent: the engine inserts then updates within one
//! request and relies on reading its own write.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cs_domain::audit::{AuditEntry, CostEntry};
use cs_domain::call::{Call, CallPatch};
use cs_domain::error::Result;
use cs_domain::objection::Objection;
use cs_domain::prospect::Prospect;
use cs_domain::tenant::{Closer, Tenant};

pub use memory::MemoryWarehouse;

/// Tenant-scoped persistence contract consumed by the engine.
///
/// Failure semantics: every error names the failing operation; bound
/// parameters that could carry secrets are elided from messages. The caller
/// decides whether to retry or mark the owning entity as errored.
#[async_trait]
pub trait Warehouse: Send + Sync {
    // ── Tenants ──────────────────────────────────────────────────────
    async fn insert_tenant(&self, tenant: &Tenant) -> Result<()>;
    async fn update_tenant(&self, tenant: &Tenant) -> Result<()>;
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>>;
    /// Admin span: the sweeper batch job iterates every active tenant.
    async fn list_active_tenants_all_tenants(&self) -> Result<Vec<Tenant>>;

    // ── Closers ──────────────────────────────────────────────────────
    async fn insert_closer(&self, tenant_id: &str, closer: &Closer) -> Result<()>;
    async fn update_closer(&self, tenant_id: &str, closer: &Closer) -> Result<()>;
    async fn get_closer(&self, tenant_id: &str, closer_id: &str) -> Result<Option<Closer>>;
    /// Active closer with this work email within the tenant.
    async fn find_closer_by_email(
        &self,
        tenant_id: &str,
        work_email: &str,
    ) -> Result<Option<Closer>>;
    /// Admin span: transcript webhooks arrive with no tenant context and are
    /// resolved through the recorder's identity across all tenants.
    async fn find_closers_by_email_all_tenants(&self, work_email: &str) -> Result<Vec<Closer>>;
    async fn list_active_closers(&self, tenant_id: &str) -> Result<Vec<Closer>>;

    // ── Calls ────────────────────────────────────────────────────────
    async fn insert_call(&self, tenant_id: &str, call: &Call) -> Result<()>;
    /// Apply a partial update and return the post-update row.
    async fn update_call(&self, tenant_id: &str, call_id: &str, patch: &CallPatch)
        -> Result<Call>;
    async fn get_call(&self, tenant_id: &str, call_id: &str) -> Result<Option<Call>>;
    /// Most recently created call for this external event id. The external
    /// id is not unique (follow-up reuse), so dispatch always wants the
    /// newest row.
    async fn find_call_by_event(
        &self,
        tenant_id: &str,
        external_event_id: &str,
    ) -> Result<Option<Call>>;
    /// Call already linked to this transcript URL, if any. Lets a repeated
    /// webhook delivery find the call it already updated instead of
    /// creating a duplicate.
    async fn find_call_by_transcript_url(
        &self,
        tenant_id: &str,
        transcript_url: &str,
    ) -> Result<Option<Call>>;
    /// Pre-outcome calls owned by a closer, for transcript matching.
    async fn pre_outcome_calls_for_closer(
        &self,
        tenant_id: &str,
        closer_id: &str,
    ) -> Result<Vec<Call>>;
    /// Pre-outcome calls for a closer overlapping [start, end). Overlap is
    /// start-inclusive, end-exclusive: a call ending at T does not overlap
    /// one starting at T.
    async fn overlapping_pre_outcome_calls(
        &self,
        tenant_id: &str,
        closer_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_call_id: &str,
    ) -> Result<Vec<Call>>;
    /// Sweeper phase 1: calls in {unset, Scheduled} whose appointment end
    /// (or start, when no end) is strictly before `now`.
    async fn pending_past_appointment(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Call>>;
    /// Sweeper phase 2: Waiting calls whose end is before `cutoff`.
    async fn waiting_older_than(
        &self,
        tenant_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Call>>;
    /// Most recent conversational call for a prospect, for payment
    /// attachment.
    async fn latest_conversational_call(
        &self,
        tenant_id: &str,
        prospect_email: &str,
    ) -> Result<Option<Call>>;
    /// Prior conversational calls for a prospect, for call-type
    /// determination.
    async fn count_conversational_calls(
        &self,
        tenant_id: &str,
        prospect_email: &str,
    ) -> Result<u32>;

    // ── Prospects ────────────────────────────────────────────────────
    async fn insert_prospect(&self, tenant_id: &str, prospect: &Prospect) -> Result<()>;
    async fn update_prospect(&self, tenant_id: &str, prospect: &Prospect) -> Result<()>;
    async fn find_prospect(&self, tenant_id: &str, email: &str) -> Result<Option<Prospect>>;

    // ── Objections ───────────────────────────────────────────────────
    async fn insert_objection(&self, tenant_id: &str, objection: &Objection) -> Result<()>;

    // ── Audit & cost (append-only) ───────────────────────────────────
    async fn append_audit(&self, tenant_id: &str, entry: &AuditEntry) -> Result<()>;
    async fn append_cost(&self, tenant_id: &str, entry: &CostEntry) -> Result<()>;

    // ── Health ───────────────────────────────────────────────────────
    /// Lightweight probe for the operational health endpoint.
    async fn ping(&self) -> bool;
}
