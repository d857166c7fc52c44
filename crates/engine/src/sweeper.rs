//! The three-phase timeout sweeper.
//!
//! Runs on a fixed interval; a tick completes before the next begins.
//! Phase 1 moves past-due pending calls to Waiting for Outcome, phase 1.5
//! pulls transcripts from providers with a listing API for calls stuck in
//! Waiting, phase 2 ghosts Waiting calls past the timeout window.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use cs_domain::audit::TriggerSource;
use cs_domain::call::CallPatch;
use cs_domain::config::SweeperConfig;
use cs_domain::error::Result;
use cs_domain::taxonomy::{CallState, ProcessingState};
use cs_domain::tenant::Tenant;
use cs_domain::transitions::Trigger;
use cs_providers::transcript::{Normalized, TranscriptRegistry};
use cs_warehouse::Warehouse;

use crate::state_machine::StateMachine;
use crate::transcript_ingest::{match_call, CallHint, TranscriptIngest};

#[derive(Debug, Default)]
pub struct SweepReport {
    pub moved_to_waiting: usize,
    pub transcripts_pulled: usize,
    pub ghosted: usize,
}

pub struct Sweeper {
    warehouse: Arc<dyn Warehouse>,
    machine: Arc<StateMachine>,
    ingest: Arc<TranscriptIngest>,
    transcripts: Arc<TranscriptRegistry>,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        machine: Arc<StateMachine>,
        ingest: Arc<TranscriptIngest>,
        transcripts: Arc<TranscriptRegistry>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            warehouse,
            machine,
            ingest,
            transcripts,
            config,
        }
    }

    /// One batch tick across every active tenant. Per-tenant failures are
    /// logged and do not stop the batch.
    pub async fn tick(&self) -> SweepReport {
        let now = Utc::now();
        let mut report = SweepReport::default();
        let tenants = match self.warehouse.list_active_tenants_all_tenants().await {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "sweeper could not list tenants");
                return report;
            }
        };
        for tenant in tenants {
            match self.sweep_tenant(&tenant, now).await {
                Ok(r) => {
                    report.moved_to_waiting += r.moved_to_waiting;
                    report.transcripts_pulled += r.transcripts_pulled;
                    report.ghosted += r.ghosted;
                }
                Err(e) => {
                    tracing::error!(tenant = %tenant.id, error = %e, "tenant sweep failed");
                }
            }
        }
        if report.moved_to_waiting + report.transcripts_pulled + report.ghosted > 0 {
            tracing::info!(
                moved_to_waiting = report.moved_to_waiting,
                transcripts_pulled = report.transcripts_pulled,
                ghosted = report.ghosted,
                "sweep tick complete"
            );
        }
        report
    }

    pub async fn sweep_tenant(&self, tenant: &Tenant, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        report.moved_to_waiting = self.phase_pending_to_waiting(tenant, now).await?;
        report.transcripts_pulled = self.phase_pull_transcripts(tenant, now).await?;
        report.ghosted = self.phase_waiting_to_ghosted(tenant, now).await?;
        Ok(report)
    }

    /// Phase 1: appointment time strictly past, still pending.
    async fn phase_pending_to_waiting(
        &self,
        tenant: &Tenant,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let due = self.warehouse.pending_past_appointment(&tenant.id, now).await?;
        let mut moved = 0;
        for call in due {
            match self
                .machine
                .transition(
                    &tenant.id,
                    &call.id,
                    CallState::Waiting,
                    Trigger::AppointmentTimePassed,
                    CallPatch::default(),
                    TriggerSource::Timeout,
                )
                .await
            {
                Ok(_) => moved += 1,
                Err(e) => {
                    tracing::warn!(tenant = %tenant.id, call = %call.id, error = %e, "phase-1 transition failed");
                }
            }
        }
        Ok(moved)
    }

    /// Phase 1.5: pull-based catch-up for providers with a listing API.
    /// Failures are per-closer and non-fatal.
    async fn phase_pull_transcripts(
        &self,
        tenant: &Tenant,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let since = now - Duration::hours(self.config.pull_lookback_hours);
        let closers = self.warehouse.list_active_closers(&tenant.id).await?;
        let mut dispatched = 0;

        for closer in closers {
            if closer.transcript_credential.is_none() {
                continue;
            }
            let provider = closer
                .transcript_provider
                .clone()
                .unwrap_or_else(|| tenant.default_transcript_provider.clone());
            let Some(pull) = self.transcripts.pull_api(&provider) else {
                continue;
            };
            let Some(adapter) = self.transcripts.adapter(&provider) else {
                continue;
            };

            let meetings = match pull.list_meetings_since(&closer, since).await {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(
                        tenant = %tenant.id,
                        closer = %closer.id,
                        provider = %provider,
                        error = %e,
                        "pull listing failed for closer (continuing)"
                    );
                    continue;
                }
            };
            if meetings.is_empty() {
                continue;
            }

            // Only calls already waiting for an outcome are candidates; the
            // webhook path owns everything earlier.
            let waiting: Vec<_> = self
                .warehouse
                .pre_outcome_calls_for_closer(&tenant.id, &closer.id)
                .await?
                .into_iter()
                .filter(|c| c.attendance == CallState::Waiting)
                .collect();
            if waiting.is_empty() {
                continue;
            }

            for raw in meetings {
                let transcript = match adapter.normalize(&raw) {
                    Ok(Normalized::Transcript(t)) => *t,
                    Ok(Normalized::MetadataOnly { .. }) => continue,
                    Err(e) => {
                        tracing::warn!(provider = %provider, error = %e, "pulled meeting unnormalizable");
                        continue;
                    }
                };
                let Some(target) = match_call(&waiting, &transcript) else {
                    continue;
                };
                let hint = CallHint {
                    call_id: target.id.clone(),
                    tenant_id: tenant.id.clone(),
                };
                match self.ingest.ingest(&provider, &raw, Some(&hint)).await {
                    Ok(_) => dispatched += 1,
                    Err(e) => {
                        tracing::warn!(
                            tenant = %tenant.id,
                            call = %target.id,
                            error = %e,
                            "pulled transcript dispatch failed"
                        );
                    }
                }
            }
        }
        Ok(dispatched)
    }

    /// Phase 2: Waiting past the timeout window becomes Ghosted.
    async fn phase_waiting_to_ghosted(
        &self,
        tenant: &Tenant,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let cutoff = now - Duration::minutes(self.config.ghost_timeout_minutes);
        let stale = self.warehouse.waiting_older_than(&tenant.id, cutoff).await?;
        let mut ghosted = 0;
        for call in stale {
            match self
                .machine
                .transition(
                    &tenant.id,
                    &call.id,
                    CallState::Ghosted,
                    Trigger::TranscriptTimeout,
                    CallPatch {
                        processing_state: Some(ProcessingState::Complete),
                        ..Default::default()
                    },
                    TriggerSource::Timeout,
                )
                .await
            {
                Ok(_) => ghosted += 1,
                Err(e) => {
                    tracing::warn!(tenant = %tenant.id, call = %call.id, error = %e, "phase-2 transition failed");
                }
            }
        }
        Ok(ghosted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cs_domain::call::Call;
    use cs_domain::tenant::Closer;
    use cs_warehouse::MemoryWarehouse;

    use crate::ai::AiPipeline;
    use crate::alerts::RecordingAlertSink;
    use crate::audit::AuditWriter;

    use async_trait::async_trait;
    use cs_providers::llm::{AnalysisRequest, AnalysisResponse, LlmProvider, Usage};

    struct NoLlm;

    #[async_trait]
    impl LlmProvider for NoLlm {
        async fn analyze(&self, _req: AnalysisRequest) -> cs_domain::error::Result<AnalysisResponse> {
            Ok(AnalysisResponse {
                content: serde_json::json!({ "call_outcome": "Follow Up" }).to_string(),
                usage: Usage::default(),
                model: "stub".into(),
            })
        }
        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    fn sweeper(warehouse: Arc<MemoryWarehouse>) -> Sweeper {
        let audit = Arc::new(AuditWriter::new(warehouse.clone()));
        let alerts = RecordingAlertSink::new();
        let machine = Arc::new(StateMachine::new(warehouse.clone(), audit.clone()));
        let registry = Arc::new(TranscriptRegistry::new());
        let ai = Arc::new(AiPipeline::new(
            Arc::new(NoLlm),
            warehouse.clone(),
            machine.clone(),
            audit.clone(),
            cs_domain::config::LlmConfig::default(),
        ));
        let ingest = Arc::new(TranscriptIngest::new(
            warehouse.clone(),
            machine.clone(),
            registry.clone(),
            ai,
            audit,
            alerts,
        ));
        Sweeper::new(
            warehouse,
            machine,
            ingest,
            registry,
            SweeperConfig::default(),
        )
    }

    #[tokio::test]
    async fn ghost_then_timeout_lifecycle() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let tenant = Tenant::new("friends_inc");
        warehouse.insert_tenant(&tenant).await.unwrap();
        let closer = Closer::new(&tenant.id, "Sarah Lane", "sarah@x.com");
        warehouse.insert_closer(&tenant.id, &closer).await.unwrap();
        let call = Call::new(
            &tenant.id,
            &closer.id,
            "evt1",
            "2026-02-20T20:00:00Z",
            Some("2026-02-20T21:00:00Z"),
            "UTC",
        );
        warehouse.insert_call(&tenant.id, &call).await.unwrap();
        let sweeper = sweeper(warehouse.clone());

        // Shortly after the appointment end: phase 1 fires, phase 2 not yet.
        let just_after = Utc.with_ymd_and_hms(2026, 2, 20, 21, 5, 0).unwrap();
        let report = sweeper.sweep_tenant(&tenant, just_after).await.unwrap();
        assert_eq!(report.moved_to_waiting, 1);
        assert_eq!(report.ghosted, 0);
        let c = warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
        assert_eq!(c.attendance, CallState::Waiting);

        // Within the 120-minute window: still waiting.
        let within = Utc.with_ymd_and_hms(2026, 2, 20, 22, 30, 0).unwrap();
        let report = sweeper.sweep_tenant(&tenant, within).await.unwrap();
        assert_eq!(report.ghosted, 0);

        // Past the window: ghosted.
        let past = Utc.with_ymd_and_hms(2026, 2, 20, 23, 5, 0).unwrap();
        let report = sweeper.sweep_tenant(&tenant, past).await.unwrap();
        assert_eq!(report.ghosted, 1);
        let c = warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
        assert_eq!(c.attendance, CallState::Ghosted);
        assert_eq!(c.processing_state, ProcessingState::Complete);
    }

    #[tokio::test]
    async fn sweep_does_not_touch_future_calls() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let tenant = Tenant::new("friends_inc");
        warehouse.insert_tenant(&tenant).await.unwrap();
        let closer = Closer::new(&tenant.id, "Sarah Lane", "sarah@x.com");
        warehouse.insert_closer(&tenant.id, &closer).await.unwrap();
        let call = Call::new(
            &tenant.id,
            &closer.id,
            "evt1",
            "2026-02-20T20:00:00Z",
            Some("2026-02-20T21:00:00Z"),
            "UTC",
        );
        warehouse.insert_call(&tenant.id, &call).await.unwrap();
        let sweeper = sweeper(warehouse.clone());

        let before = Utc.with_ymd_and_hms(2026, 2, 20, 19, 0, 0).unwrap();
        let report = sweeper.sweep_tenant(&tenant, before).await.unwrap();
        assert_eq!(report.moved_to_waiting, 0);
        let c = warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
        assert_eq!(c.attendance, CallState::Unset);
    }
}
