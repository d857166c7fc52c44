//! The inline AI analysis pipeline.
//!
//! Invoked synchronously when a call transitions to Show with a real
//! transcript. One LLM call, no internal retries: a failed or unparseable
//! analysis marks the call's processing state as error and leaves the Show
//! in place; recovery is manual or via reprocessing.

pub mod prompt;
pub mod response;

use std::sync::Arc;
use std::time::Instant;

use cs_domain::audit::{AuditAction, AuditEntry, CostEntry, TriggerSource};
use cs_domain::call::{Call, CallPatch};
use cs_domain::config::LlmConfig;
use cs_domain::error::{Error, Result};
use cs_domain::objection::Objection;
use cs_domain::taxonomy::ProcessingState;
use cs_domain::tenant::{Closer, Tenant};
use cs_domain::transitions::Trigger;
use cs_providers::llm::{AnalysisRequest, LlmProvider};
use cs_warehouse::Warehouse;

use crate::audit::AuditWriter;
use crate::state_machine::StateMachine;

pub struct AiPipeline {
    llm: Arc<dyn LlmProvider>,
    warehouse: Arc<dyn Warehouse>,
    machine: Arc<StateMachine>,
    audit: Arc<AuditWriter>,
    config: LlmConfig,
}

impl AiPipeline {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        warehouse: Arc<dyn Warehouse>,
        machine: Arc<StateMachine>,
        audit: Arc<AuditWriter>,
        config: LlmConfig,
    ) -> Self {
        Self {
            llm,
            warehouse,
            machine,
            audit,
            config,
        }
    }

    /// Analyze a shown call: assemble the prompt, call the model, validate,
    /// persist outcome + scores + objections + cost. On any failure the
    /// call keeps attendance Show with processing state error.
    pub async fn analyze(
        &self,
        tenant: &Tenant,
        call: &Call,
        closer: &Closer,
        transcript_text: &str,
    ) -> Result<Call> {
        self.warehouse
            .update_call(
                &tenant.id,
                &call.id,
                &CallPatch {
                    processing_state: Some(ProcessingState::Processing),
                    ..Default::default()
                },
            )
            .await?;

        let request = AnalysisRequest {
            system: prompt::system_prompt(tenant),
            user: prompt::user_message(call, &closer.display_name, transcript_text),
            max_tokens: self.config.max_tokens,
            model: None,
        };

        let started = Instant::now();
        let response = match self.llm.analyze(request).await {
            Ok(r) => r,
            Err(e) => {
                self.mark_error(&tenant.id, &call.id, &e, "llm_call_failed").await;
                return Err(e);
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let parsed = match response::parse_response(&response.content) {
            Ok(p) => p,
            Err(e) => {
                self.mark_error(&tenant.id, &call.id, &e, "unparseable_response").await;
                return Err(e);
            }
        };

        let patch = CallPatch {
            call_outcome: Some(parsed.outcome),
            scores: Some(parsed.scores),
            prospect_temperature: parsed.prospect_temperature.clone(),
            ai_goals: parsed.goals.clone(),
            ai_pains: parsed.pains.clone(),
            ai_situation: parsed.situation.clone(),
            ai_summary: parsed.summary.clone(),
            ai_feedback: parsed.coaching_feedback.clone(),
            processing_state: Some(ProcessingState::Complete),
            ..Default::default()
        };
        let updated = match self
            .machine
            .transition(
                &tenant.id,
                &call.id,
                parsed.outcome.as_state(),
                Trigger::AiOutcome,
                patch,
                TriggerSource::AiProcessing,
            )
            .await
        {
            Ok(c) => c,
            Err(e) => {
                self.mark_error(&tenant.id, &call.id, &e, "outcome_transition_rejected")
                    .await;
                return Err(e);
            }
        };

        for parsed_objection in &parsed.objections {
            let mut objection = Objection::new(
                &call.id,
                &tenant.id,
                &closer.id,
                parsed_objection.objection_type,
                &parsed_objection.prospect_phrase,
            );
            objection.seconds_into_call = parsed_objection.seconds_into_call;
            objection.resolved = parsed_objection.resolved;
            objection.resolution_text = parsed_objection.resolution_text.clone();
            if let Err(e) = self.warehouse.insert_objection(&tenant.id, &objection).await {
                tracing::warn!(
                    tenant = %tenant.id,
                    call = %call.id,
                    error = %e,
                    "objection insert failed"
                );
            }
        }

        let cost = CostEntry::priced(
            &tenant.id,
            &call.id,
            &response.model,
            response.usage.input_tokens,
            response.usage.output_tokens,
            self.config.input_rate_per_million,
            self.config.output_rate_per_million,
            duration_ms,
        );
        if let Err(e) = self.warehouse.append_cost(&tenant.id, &cost).await {
            tracing::warn!(tenant = %tenant.id, call = %call.id, error = %e, "cost insert failed");
        }

        tracing::info!(
            tenant = %tenant.id,
            call = %call.id,
            outcome = %parsed.outcome,
            objections = parsed.objections.len(),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            duration_ms,
            "call analyzed"
        );
        Ok(updated)
    }

    /// Record a failed analysis: processing state error, error audit entry,
    /// attendance untouched.
    async fn mark_error(&self, tenant_id: &str, call_id: &str, error: &Error, detail: &str) {
        if let Err(e) = self
            .warehouse
            .update_call(
                tenant_id,
                call_id,
                &CallPatch {
                    processing_state: Some(ProcessingState::Error),
                    ..Default::default()
                },
            )
            .await
        {
            tracing::error!(tenant = %tenant_id, call = %call_id, error = %e, "failed to mark call errored");
        }
        self.audit
            .record(
                AuditEntry::new(
                    tenant_id,
                    "call",
                    call_id,
                    AuditAction::Error,
                    TriggerSource::AiProcessing,
                )
                .with_detail(detail)
                .with_metadata(serde_json::json!({ "error": error.to_string() })),
            )
            .await;
    }
}
