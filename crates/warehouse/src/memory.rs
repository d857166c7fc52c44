//! In-memory warehouse backend.
//!
//! The reference implementation of the gateway contract: immediate
//! consistency, tenant scoping enforced on every method, append-only audit
//! and cost tables. A durable columnar backend slots in behind the same
//! trait without changing callers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use cs_domain::audit::{AuditEntry, CostEntry};
use cs_domain::call::{Call, CallPatch};
use cs_domain::error::{Error, Result};
use cs_domain::objection::Objection;
use cs_domain::prospect::Prospect;
use cs_domain::tenant::{normalize_email, Closer, CloserStatus, Tenant};

use crate::Warehouse;

fn err(op: &str, message: impl Into<String>) -> Error {
    Error::Warehouse {
        op: op.to_string(),
        message: message.into(),
    }
}

/// Sort key for "most recent" call queries: scheduled start when parseable,
/// creation stamp otherwise.
fn recency_key(call: &Call) -> DateTime<Utc> {
    call.start_utc().unwrap_or(call.created_at)
}

#[derive(Default)]
pub struct MemoryWarehouse {
    tenants: RwLock<HashMap<String, Tenant>>,
    closers: RwLock<HashMap<String, Closer>>,
    calls: RwLock<HashMap<String, Call>>,
    prospects: RwLock<HashMap<String, Prospect>>,
    objections: RwLock<Vec<Objection>>,
    audit: RwLock<Vec<AuditEntry>>,
    costs: RwLock<Vec<CostEntry>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Inspection helpers (tests and diagnostics, not on the trait) ──

    pub async fn objections_for_call(&self, call_id: &str) -> Vec<Objection> {
        self.objections
            .read()
            .await
            .iter()
            .filter(|o| o.call_id == call_id)
            .cloned()
            .collect()
    }

    pub async fn audit_for_entity(&self, entity_id: &str) -> Vec<AuditEntry> {
        self.audit
            .read()
            .await
            .iter()
            .filter(|a| a.entity_id == entity_id)
            .cloned()
            .collect()
    }

    pub async fn costs_for_call(&self, call_id: &str) -> Vec<CostEntry> {
        self.costs
            .read()
            .await
            .iter()
            .filter(|c| c.call_id == call_id)
            .cloned()
            .collect()
    }

    pub async fn calls_for_tenant(&self, tenant_id: &str) -> Vec<Call> {
        self.calls
            .read()
            .await
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    // ── Tenants ──────────────────────────────────────────────────────

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<()> {
        let mut tenants = self.tenants.write().await;
        if tenants.contains_key(&tenant.id) {
            return Err(err("insert_tenant", format!("duplicate key {}", tenant.id)));
        }
        tenants.insert(tenant.id.clone(), tenant.clone());
        Ok(())
    }

    async fn update_tenant(&self, tenant: &Tenant) -> Result<()> {
        let mut tenants = self.tenants.write().await;
        if !tenants.contains_key(&tenant.id) {
            return Err(err("update_tenant", format!("no tenant {}", tenant.id)));
        }
        tenants.insert(tenant.id.clone(), tenant.clone());
        Ok(())
    }

    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        Ok(self.tenants.read().await.get(tenant_id).cloned())
    }

    async fn list_active_tenants_all_tenants(&self) -> Result<Vec<Tenant>> {
        let mut out: Vec<Tenant> = self
            .tenants
            .read()
            .await
            .values()
            .filter(|t| t.active)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    // ── Closers ──────────────────────────────────────────────────────

    async fn insert_closer(&self, tenant_id: &str, closer: &Closer) -> Result<()> {
        if closer.tenant_id != tenant_id {
            return Err(err("insert_closer", "closer does not belong to tenant"));
        }
        let mut closers = self.closers.write().await;
        if closers.contains_key(&closer.id) {
            return Err(err("insert_closer", format!("duplicate key {}", closer.id)));
        }
        let email = normalize_email(&closer.work_email);
        let clash = closers.values().any(|c| {
            c.tenant_id == tenant_id && c.is_active() && c.work_email == email
        });
        if closer.is_active() && clash {
            return Err(err(
                "insert_closer",
                "active closer with this work email already exists in tenant",
            ));
        }
        closers.insert(closer.id.clone(), closer.clone());
        Ok(())
    }

    async fn update_closer(&self, tenant_id: &str, closer: &Closer) -> Result<()> {
        let mut closers = self.closers.write().await;
        match closers.get(&closer.id) {
            Some(existing) if existing.tenant_id == tenant_id => {
                closers.insert(closer.id.clone(), closer.clone());
                Ok(())
            }
            _ => Err(err("update_closer", format!("no closer {}", closer.id))),
        }
    }

    async fn get_closer(&self, tenant_id: &str, closer_id: &str) -> Result<Option<Closer>> {
        Ok(self
            .closers
            .read()
            .await
            .get(closer_id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_closer_by_email(
        &self,
        tenant_id: &str,
        work_email: &str,
    ) -> Result<Option<Closer>> {
        let email = normalize_email(work_email);
        Ok(self
            .closers
            .read()
            .await
            .values()
            .find(|c| c.tenant_id == tenant_id && c.is_active() && c.work_email == email)
            .cloned())
    }

    async fn find_closers_by_email_all_tenants(&self, work_email: &str) -> Result<Vec<Closer>> {
        let email = normalize_email(work_email);
        Ok(self
            .closers
            .read()
            .await
            .values()
            .filter(|c| c.is_active() && c.work_email == email)
            .cloned()
            .collect())
    }

    async fn list_active_closers(&self, tenant_id: &str) -> Result<Vec<Closer>> {
        let mut out: Vec<Closer> = self
            .closers
            .read()
            .await
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.status == CloserStatus::Active)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }

    // ── Calls ────────────────────────────────────────────────────────

    async fn insert_call(&self, tenant_id: &str, call: &Call) -> Result<()> {
        if call.tenant_id != tenant_id {
            return Err(err("insert_call", "call does not belong to tenant"));
        }
        let mut calls = self.calls.write().await;
        if calls.contains_key(&call.id) {
            return Err(err("insert_call", format!("duplicate key {}", call.id)));
        }
        calls.insert(call.id.clone(), call.clone());
        Ok(())
    }

    async fn update_call(
        &self,
        tenant_id: &str,
        call_id: &str,
        patch: &CallPatch,
    ) -> Result<Call> {
        let mut calls = self.calls.write().await;
        let call = calls
            .get_mut(call_id)
            .filter(|c| c.tenant_id == tenant_id)
            .ok_or_else(|| err("update_call", format!("no call {call_id}")))?;
        patch.apply(call);
        Ok(call.clone())
    }

    async fn get_call(&self, tenant_id: &str, call_id: &str) -> Result<Option<Call>> {
        Ok(self
            .calls
            .read()
            .await
            .get(call_id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_call_by_event(
        &self,
        tenant_id: &str,
        external_event_id: &str,
    ) -> Result<Option<Call>> {
        Ok(self
            .calls
            .read()
            .await
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.external_event_id == external_event_id)
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn find_call_by_transcript_url(
        &self,
        tenant_id: &str,
        transcript_url: &str,
    ) -> Result<Option<Call>> {
        Ok(self
            .calls
            .read()
            .await
            .values()
            .filter(|c| {
                c.tenant_id == tenant_id && c.transcript_url.as_deref() == Some(transcript_url)
            })
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn pre_outcome_calls_for_closer(
        &self,
        tenant_id: &str,
        closer_id: &str,
    ) -> Result<Vec<Call>> {
        Ok(self
            .calls
            .read()
            .await
            .values()
            .filter(|c| {
                c.tenant_id == tenant_id
                    && c.closer_id == closer_id
                    && c.attendance.is_pre_outcome()
            })
            .cloned()
            .collect())
    }

    async fn overlapping_pre_outcome_calls(
        &self,
        tenant_id: &str,
        closer_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_call_id: &str,
    ) -> Result<Vec<Call>> {
        Ok(self
            .calls
            .read()
            .await
            .values()
            .filter(|c| {
                c.tenant_id == tenant_id
                    && c.closer_id == closer_id
                    && c.id != exclude_call_id
                    && c.attendance.is_pre_outcome()
            })
            .filter(|c| match (c.start_utc(), c.end_utc()) {
                // Start-inclusive, end-exclusive.
                (Some(s), Some(e)) => s < end && e > start,
                _ => false,
            })
            .cloned()
            .collect())
    }

    async fn pending_past_appointment(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Call>> {
        use cs_domain::taxonomy::CallState;
        Ok(self
            .calls
            .read()
            .await
            .values()
            .filter(|c| {
                c.tenant_id == tenant_id
                    && matches!(c.attendance, CallState::Unset | CallState::Scheduled)
                    && c.end_utc().is_some_and(|e| e < now)
            })
            .cloned()
            .collect())
    }

    async fn waiting_older_than(
        &self,
        tenant_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Call>> {
        use cs_domain::taxonomy::CallState;
        Ok(self
            .calls
            .read()
            .await
            .values()
            .filter(|c| {
                c.tenant_id == tenant_id
                    && c.attendance == CallState::Waiting
                    && c.end_utc().is_some_and(|e| e < cutoff)
            })
            .cloned()
            .collect())
    }

    async fn latest_conversational_call(
        &self,
        tenant_id: &str,
        prospect_email: &str,
    ) -> Result<Option<Call>> {
        let email = normalize_email(prospect_email);
        Ok(self
            .calls
            .read()
            .await
            .values()
            .filter(|c| {
                c.tenant_id == tenant_id
                    && c.prospect_email == email
                    && c.attendance.is_conversational()
            })
            .max_by_key(|c| recency_key(c))
            .cloned())
    }

    async fn count_conversational_calls(
        &self,
        tenant_id: &str,
        prospect_email: &str,
    ) -> Result<u32> {
        let email = normalize_email(prospect_email);
        Ok(self
            .calls
            .read()
            .await
            .values()
            .filter(|c| {
                c.tenant_id == tenant_id
                    && c.prospect_email == email
                    && c.attendance.is_conversational()
            })
            .count() as u32)
    }

    // ── Prospects ────────────────────────────────────────────────────

    async fn insert_prospect(&self, tenant_id: &str, prospect: &Prospect) -> Result<()> {
        if prospect.tenant_id != tenant_id {
            return Err(err("insert_prospect", "prospect does not belong to tenant"));
        }
        let mut prospects = self.prospects.write().await;
        let email = normalize_email(&prospect.email);
        if prospects
            .values()
            .any(|p| p.tenant_id == tenant_id && p.email == email)
        {
            return Err(err(
                "insert_prospect",
                "duplicate (tenant, email) key",
            ));
        }
        prospects.insert(prospect.id.clone(), prospect.clone());
        Ok(())
    }

    async fn update_prospect(&self, tenant_id: &str, prospect: &Prospect) -> Result<()> {
        let mut prospects = self.prospects.write().await;
        match prospects.get(&prospect.id) {
            Some(existing) if existing.tenant_id == tenant_id => {
                prospects.insert(prospect.id.clone(), prospect.clone());
                Ok(())
            }
            _ => Err(err("update_prospect", format!("no prospect {}", prospect.id))),
        }
    }

    async fn find_prospect(&self, tenant_id: &str, email: &str) -> Result<Option<Prospect>> {
        let email = normalize_email(email);
        Ok(self
            .prospects
            .read()
            .await
            .values()
            .find(|p| p.tenant_id == tenant_id && p.email == email)
            .cloned())
    }

    // ── Objections ───────────────────────────────────────────────────

    async fn insert_objection(&self, tenant_id: &str, objection: &Objection) -> Result<()> {
        if objection.tenant_id != tenant_id {
            return Err(err("insert_objection", "objection does not belong to tenant"));
        }
        self.objections.write().await.push(objection.clone());
        Ok(())
    }

    // ── Audit & cost ─────────────────────────────────────────────────

    async fn append_audit(&self, tenant_id: &str, entry: &AuditEntry) -> Result<()> {
        if entry.tenant_id != tenant_id {
            return Err(err("append_audit", "entry does not belong to tenant"));
        }
        self.audit.write().await.push(entry.clone());
        Ok(())
    }

    async fn append_cost(&self, tenant_id: &str, entry: &CostEntry) -> Result<()> {
        if entry.tenant_id != tenant_id {
            return Err(err("append_cost", "entry does not belong to tenant"));
        }
        self.costs.write().await.push(entry.clone());
        Ok(())
    }

    // ── Health ───────────────────────────────────────────────────────

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cs_domain::taxonomy::CallState;

    fn call_at(tenant: &str, closer: &str, event: &str, start: &str, end: &str) -> Call {
        Call::new(tenant, closer, event, start, Some(end), "UTC")
    }

    #[tokio::test]
    async fn insert_then_update_within_one_request() {
        let wh = MemoryWarehouse::new();
        let call = call_at("t1", "c1", "evt1", "2026-02-20T20:00:00Z", "2026-02-20T21:00:00Z");
        wh.insert_call("t1", &call).await.unwrap();
        let updated = wh
            .update_call(
                "t1",
                &call.id,
                &CallPatch {
                    attendance: Some(CallState::Show),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.attendance, CallState::Show);
    }

    #[tokio::test]
    async fn tenant_scoping_hides_foreign_rows() {
        let wh = MemoryWarehouse::new();
        let call = call_at("t1", "c1", "evt1", "2026-02-20T20:00:00Z", "2026-02-20T21:00:00Z");
        wh.insert_call("t1", &call).await.unwrap();
        assert!(wh.get_call("t2", &call.id).await.unwrap().is_none());
        assert!(wh
            .update_call("t2", &call.id, &CallPatch::default())
            .await
            .is_err());
        assert!(wh.find_call_by_event("t2", "evt1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_call_by_event_returns_newest_row() {
        let wh = MemoryWarehouse::new();
        let mut old = call_at("t1", "c1", "evt1", "2026-02-20T20:00:00Z", "2026-02-20T21:00:00Z");
        old.created_at = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let new = call_at("t1", "c1", "evt1", "2026-02-25T20:00:00Z", "2026-02-25T21:00:00Z");
        wh.insert_call("t1", &old).await.unwrap();
        wh.insert_call("t1", &new).await.unwrap();
        let found = wh.find_call_by_event("t1", "evt1").await.unwrap().unwrap();
        assert_eq!(found.id, new.id);
    }

    #[tokio::test]
    async fn overlap_is_start_inclusive_end_exclusive() {
        let wh = MemoryWarehouse::new();
        let a = call_at("t1", "c1", "evt_a", "2026-02-20T14:00:00Z", "2026-02-20T15:00:00Z");
        let b = call_at("t1", "c1", "evt_b", "2026-02-20T14:30:00Z", "2026-02-20T15:30:00Z");
        // Touches a's end exactly; must not overlap.
        let c = call_at("t1", "c1", "evt_c", "2026-02-20T15:00:00Z", "2026-02-20T16:00:00Z");
        for call in [&a, &b, &c] {
            wh.insert_call("t1", call).await.unwrap();
        }
        let start = Utc.with_ymd_and_hms(2026, 2, 20, 14, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 2, 20, 15, 0, 0).unwrap();
        let hits = wh
            .overlapping_pre_outcome_calls("t1", "c1", start, end, &a.id)
            .await
            .unwrap();
        let ids: Vec<&str> = hits.iter().map(|c| c.id.as_str()).collect();
        assert!(ids.contains(&b.id.as_str()));
        assert!(!ids.contains(&c.id.as_str()), "touching interval must not overlap");
    }

    #[tokio::test]
    async fn duplicate_active_closer_email_rejected_within_tenant() {
        let wh = MemoryWarehouse::new();
        let t = Tenant::new("T");
        wh.insert_tenant(&t).await.unwrap();
        let c1 = Closer::new(&t.id, "Sarah Lane", "sarah@x.com");
        let c2 = Closer::new(&t.id, "Other Sarah", "sarah@x.com");
        wh.insert_closer(&t.id, &c1).await.unwrap();
        assert!(wh.insert_closer(&t.id, &c2).await.is_err());
        // Same email under a different tenant is a different closer entity.
        let t2 = Tenant::new("T2");
        wh.insert_tenant(&t2).await.unwrap();
        let c3 = Closer::new(&t2.id, "Sarah Lane", "sarah@x.com");
        wh.insert_closer(&t2.id, &c3).await.unwrap();
        let all = wh.find_closers_by_email_all_tenants("sarah@x.com").await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn conversational_queries_are_case_normalized() {
        let wh = MemoryWarehouse::new();
        let mut call =
            call_at("t1", "c1", "evt1", "2026-02-20T20:00:00Z", "2026-02-20T21:00:00Z");
        call.prospect_email = "john@ex.com".into();
        call.attendance = CallState::Show;
        wh.insert_call("t1", &call).await.unwrap();
        assert_eq!(wh.count_conversational_calls("t1", "John@EX.com").await.unwrap(), 1);
        assert!(wh
            .latest_conversational_call("t1", "JOHN@ex.com")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn sweeper_queries_select_by_state_and_time() {
        let wh = MemoryWarehouse::new();
        let pending =
            call_at("t1", "c1", "evt1", "2026-02-20T20:00:00Z", "2026-02-20T21:00:00Z");
        let mut waiting =
            call_at("t1", "c1", "evt2", "2026-02-20T10:00:00Z", "2026-02-20T11:00:00Z");
        waiting.attendance = CallState::Waiting;
        wh.insert_call("t1", &pending).await.unwrap();
        wh.insert_call("t1", &waiting).await.unwrap();

        let now = Utc.with_ymd_and_hms(2026, 2, 20, 22, 0, 0).unwrap();
        let due = wh.pending_past_appointment("t1", now).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, pending.id);

        let cutoff = Utc.with_ymd_and_hms(2026, 2, 20, 13, 0, 0).unwrap();
        let stale = wh.waiting_older_than("t1", cutoff).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, waiting.id);
    }
}
