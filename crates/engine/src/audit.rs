//! Audit trail writer.
//!
//! A failed audit write is logged and swallowed: auditing can never fail
//! the operation it records.

use std::sync::Arc;

use cs_domain::audit::AuditEntry;
use cs_warehouse::Warehouse;

pub struct AuditWriter {
    warehouse: Arc<dyn Warehouse>,
}

impl AuditWriter {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self { warehouse }
    }

    pub async fn record(&self, entry: AuditEntry) {
        let tenant_id = entry.tenant_id.clone();
        if let Err(e) = self.warehouse.append_audit(&tenant_id, &entry).await {
            tracing::warn!(
                tenant = %tenant_id,
                entity = %entry.entity_id,
                action = ?entry.action,
                error = %e,
                "audit write failed (swallowed)"
            );
        }
    }
}
