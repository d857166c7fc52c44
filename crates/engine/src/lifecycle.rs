//! Tenant and closer provisioning.
//!
//! Tenant creation allocates identity and the per-tenant webhook secret and
//! returns the URLs the customer wires up. Closer creation best-effort
//! registers the transcript provider webhook; deactivation tears external
//! registrations down without ever failing the deactivation itself.

use std::sync::Arc;

use cs_domain::audit::{AuditAction, AuditEntry, TriggerSource};
use cs_domain::error::{Error, Result};
use cs_domain::tenant::{Closer, CloserStatus, Tenant};
use cs_providers::transcript::TranscriptRegistry;
use cs_warehouse::Warehouse;

use crate::audit::AuditWriter;
use crate::push_channels::PushChannelManager;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provisioning results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct TenantProvisioned {
    pub tenant: Tenant,
    pub transcript_webhook_url: String,
    pub payment_webhook_url: String,
    pub setup_instructions: Vec<String>,
}

#[derive(Debug)]
pub struct CloserProvisioned {
    pub closer: Closer,
    /// Whether the provider webhook auto-registration succeeded. `false`
    /// is not an error; the closer exists either way.
    pub provider_webhook_registered: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewTenant {
    pub display_name: String,
    pub timezone: Option<String>,
    pub filter_phrases: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCloser {
    pub display_name: String,
    pub work_email: String,
    pub transcript_provider: Option<String>,
    pub transcript_credential: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Lifecycle {
    warehouse: Arc<dyn Warehouse>,
    transcripts: Arc<TranscriptRegistry>,
    push: Arc<PushChannelManager>,
    audit: Arc<AuditWriter>,
    public_base_url: String,
}

impl Lifecycle {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        transcripts: Arc<TranscriptRegistry>,
        push: Arc<PushChannelManager>,
        audit: Arc<AuditWriter>,
        public_base_url: String,
    ) -> Self {
        Self {
            warehouse,
            transcripts,
            push,
            audit,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn create_tenant(&self, new: NewTenant) -> Result<TenantProvisioned> {
        if new.display_name.trim().is_empty() {
            return Err(Error::Validation("tenant display_name is required".into()));
        }
        let mut tenant = Tenant::new(new.display_name.trim());
        if let Some(tz) = new.timezone {
            tenant.timezone = tz;
        }
        if let Some(phrases) = new.filter_phrases {
            tenant.filter_phrases = phrases;
        }
        self.warehouse.insert_tenant(&tenant).await?;
        self.audit
            .record(AuditEntry::new(
                &tenant.id,
                "tenant",
                &tenant.id,
                AuditAction::Created,
                TriggerSource::Admin,
            ))
            .await;
        tracing::info!(tenant = %tenant.id, name = %tenant.display_name, "tenant created");

        let transcript_webhook_url = format!(
            "{}/webhooks/transcript/{}",
            self.public_base_url, tenant.default_transcript_provider
        );
        let payment_webhook_url = format!("{}/webhooks/payment", self.public_base_url);
        let setup_instructions = vec![
            format!(
                "Point your transcript provider's webhook at {transcript_webhook_url} \
                 (closers with an API credential are registered automatically)."
            ),
            format!(
                "Send payment events to {payment_webhook_url} with \
                 'Authorization: Bearer <webhook secret>'."
            ),
            "Add closers before their first scheduled calls so calendar events resolve."
                .to_string(),
        ];
        Ok(TenantProvisioned {
            tenant,
            transcript_webhook_url,
            payment_webhook_url,
            setup_instructions,
        })
    }

    pub async fn create_closer(
        &self,
        tenant_id: &str,
        new: NewCloser,
    ) -> Result<CloserProvisioned> {
        let tenant = self
            .warehouse
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("tenant {tenant_id}")))?;
        if new.work_email.trim().is_empty() {
            return Err(Error::Validation("closer work_email is required".into()));
        }

        let mut closer = Closer::new(tenant_id, new.display_name.trim(), &new.work_email);
        closer.transcript_provider = new
            .transcript_provider
            .or_else(|| Some(tenant.default_transcript_provider.clone()));
        closer.transcript_credential = new.transcript_credential;

        // Best-effort provider webhook auto-registration. Failure leaves
        // the closer usable through the shared tenant webhook.
        let mut registered = false;
        if closer.transcript_credential.is_some() {
            let provider = closer.transcript_provider.clone().unwrap_or_default();
            if let Some(pull) = self.transcripts.pull_api(&provider) {
                let callback = format!(
                    "{}/webhooks/transcript/{provider}",
                    self.public_base_url
                );
                match pull.register_webhook(&closer, &callback).await {
                    Ok(webhook) => {
                        closer.provider_webhook_id = Some(webhook.id);
                        closer.provider_webhook_secret = Some(webhook.secret);
                        registered = true;
                    }
                    Err(e) => {
                        tracing::warn!(
                            tenant = %tenant_id,
                            email = %closer.work_email,
                            provider = %provider,
                            error = %e,
                            "provider webhook registration failed; closer created without it"
                        );
                    }
                }
            }
        }

        self.warehouse.insert_closer(tenant_id, &closer).await?;

        // Every active closer carries one calendar watch subscription.
        // Failure is non-fatal; the renewal job retries on its next pass
        // once the calendar grant exists.
        if let Err(e) = self.push.create(tenant_id, &closer).await {
            tracing::warn!(
                tenant = %tenant_id,
                closer = %closer.id,
                error = %e,
                "push channel creation failed during onboarding (continuing)"
            );
        }

        self.audit
            .record(
                AuditEntry::new(
                    tenant_id,
                    "closer",
                    &closer.id,
                    AuditAction::Created,
                    TriggerSource::Admin,
                )
                .with_metadata(serde_json::json!({
                    "provider_webhook_registered": registered,
                })),
            )
            .await;
        tracing::info!(
            tenant = %tenant_id,
            closer = %closer.id,
            webhook_registered = registered,
            "closer created"
        );
        Ok(CloserProvisioned {
            closer,
            provider_webhook_registered: registered,
        })
    }

    /// Deactivate a closer: remove external registrations (non-fatal),
    /// retain all history.
    pub async fn deactivate_closer(&self, tenant_id: &str, closer_id: &str) -> Result<Closer> {
        let mut closer = self
            .warehouse
            .get_closer(tenant_id, closer_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("closer {closer_id}")))?;

        if let (Some(webhook_id), Some(provider)) = (
            closer.provider_webhook_id.clone(),
            closer.transcript_provider.clone(),
        ) {
            if let Some(pull) = self.transcripts.pull_api(&provider) {
                if let Err(e) = pull.delete_webhook(&closer, &webhook_id).await {
                    tracing::warn!(
                        closer = %closer_id,
                        error = %e,
                        "provider webhook deletion failed (continuing)"
                    );
                }
            }
        }
        if let Err(e) = self.push.stop(closer_id).await {
            tracing::warn!(closer = %closer_id, error = %e, "push channel stop failed (continuing)");
        }

        closer.status = CloserStatus::Inactive;
        closer.provider_webhook_id = None;
        closer.provider_webhook_secret = None;
        self.warehouse.update_closer(tenant_id, &closer).await?;
        self.audit
            .record(
                AuditEntry::new(
                    tenant_id,
                    "closer",
                    closer_id,
                    AuditAction::Updated,
                    TriggerSource::Admin,
                )
                .with_change("status", "active", "inactive"),
            )
            .await;
        tracing::info!(tenant = %tenant_id, closer = %closer_id, "closer deactivated");
        Ok(closer)
    }
}
