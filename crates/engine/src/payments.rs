//! Payment reconciliation.
//!
//! Upserts the prospect aggregate, attaches the payment to the most recent
//! conversational call, and drives the close / additional-payment / refund
//! branches. Every branch leaves an audit entry with
//! trigger_source=payment_webhook and the normalized payment type as the
//! detail.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use cs_domain::audit::{AuditAction, AuditEntry, TriggerSource};
use cs_domain::call::CallPatch;
use cs_domain::error::{Error, Result};
use cs_domain::prospect::Prospect;
use cs_domain::taxonomy::{CallOutcome, CallState, PaymentType, ProcessingState};
use cs_domain::tenant::normalize_email;
use cs_domain::transitions::Trigger;
use cs_warehouse::Warehouse;

use crate::alerts::{Alert, AlertSeverity, AlertSink};
use crate::audit::AuditWriter;
use crate::state_machine::StateMachine;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Input / output
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub prospect_email: String,
    #[serde(default)]
    pub prospect_name: Option<String>,
    pub amount: f64,
    /// Defaults to today when absent.
    #[serde(default)]
    pub payment_date: Option<String>,
    pub payment_type: PaymentType,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The action taken, returned in the webhook response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAction {
    NewClose,
    AdditionalPayment,
    Refund,
    PaymentRecorded,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Processor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PaymentProcessor {
    warehouse: Arc<dyn Warehouse>,
    machine: Arc<StateMachine>,
    audit: Arc<AuditWriter>,
    alerts: Arc<dyn AlertSink>,
}

impl PaymentProcessor {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        machine: Arc<StateMachine>,
        audit: Arc<AuditWriter>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            warehouse,
            machine,
            audit,
            alerts,
        }
    }

    pub async fn process(&self, tenant_id: &str, event: &PaymentEvent) -> Result<PaymentAction> {
        let amount = event.amount.abs();
        if amount <= 0.0 {
            return Err(Error::Validation("payment amount must be non-zero".into()));
        }
        let email = normalize_email(&event.prospect_email);
        if email.is_empty() {
            return Err(Error::Validation("prospect_email is required".into()));
        }
        let payment_date = event
            .payment_date
            .clone()
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
        let reversal = event.payment_type.is_reversal();

        self.upsert_prospect(tenant_id, &email, event, amount, &payment_date, reversal)
            .await?;

        let Some(call) = self
            .warehouse
            .latest_conversational_call(tenant_id, &email)
            .await?
        else {
            self.payment_audit(
                tenant_id,
                "prospect",
                &email,
                AuditAction::PaymentReceived,
                event,
                serde_json::json!({ "amount": amount, "note": "no_matching_call" }),
            )
            .await;
            tracing::info!(
                tenant = %tenant_id,
                prospect = %email,
                amount,
                "payment recorded without a matching call"
            );
            return Ok(PaymentAction::PaymentRecorded);
        };

        if call.attendance == CallState::ClosedWon && !reversal {
            // Installment on an already-won deal.
            self.warehouse
                .update_call(
                    tenant_id,
                    &call.id,
                    &CallPatch {
                        cash_collected: Some(call.cash_collected + amount),
                        product_name: event.product_name.clone(),
                        ..Default::default()
                    },
                )
                .await?;
            self.payment_audit(
                tenant_id,
                "call",
                &call.id,
                AuditAction::PaymentReceived,
                event,
                serde_json::json!({ "amount": amount, "cash_collected": call.cash_collected + amount }),
            )
            .await;
            return Ok(PaymentAction::AdditionalPayment);
        }

        if reversal {
            return self
                .apply_reversal(tenant_id, &call.id, amount, event)
                .await;
        }

        // A close: Deposit completes with the full-payment trigger,
        // everything else closes with payment_received.
        let trigger = if call.attendance == CallState::Deposit {
            Trigger::PaymentReceivedFull
        } else {
            Trigger::PaymentReceived
        };
        let patch = CallPatch {
            call_outcome: Some(CallOutcome::ClosedWon),
            processing_state: Some(ProcessingState::Complete),
            cash_collected: Some(call.cash_collected + amount),
            revenue_generated: Some(amount),
            date_closed: Some(payment_date.clone()),
            payment_plan: Some(event.payment_type.plan_label().to_string()),
            product_name: event.product_name.clone(),
            ..Default::default()
        };

        match self
            .machine
            .transition(
                tenant_id,
                &call.id,
                CallState::ClosedWon,
                trigger,
                patch.clone(),
                TriggerSource::PaymentWebhook,
            )
            .await
        {
            Ok(_) => {}
            Err(Error::InvalidTransition { .. }) => {
                // States like Show or Disqualified have no payment edge in
                // the table; the payment is still real. Apply the same
                // updates as a direct write.
                tracing::warn!(
                    tenant = %tenant_id,
                    call = %call.id,
                    from = %call.attendance,
                    "payment close outside the transition table; applying direct write"
                );
                let mut direct = patch;
                direct.attendance = Some(CallState::ClosedWon);
                self.warehouse.update_call(tenant_id, &call.id, &direct).await?;
            }
            Err(e) => return Err(e),
        }

        self.payment_audit(
            tenant_id,
            "call",
            &call.id,
            AuditAction::PaymentClose,
            event,
            serde_json::json!({ "amount": amount, "payment_date": payment_date }),
        )
        .await;
        Ok(PaymentAction::NewClose)
    }

    /// Refund or chargeback against the matched call.
    async fn apply_reversal(
        &self,
        tenant_id: &str,
        call_id: &str,
        amount: f64,
        event: &PaymentEvent,
    ) -> Result<PaymentAction> {
        let call = self
            .warehouse
            .get_call(tenant_id, call_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("call {call_id}")))?;
        let new_cash = (call.cash_collected - amount).max(0.0);

        let mut patch = CallPatch {
            cash_collected: Some(new_cash),
            ..Default::default()
        };
        let fully_refunded_close = new_cash == 0.0 && call.attendance == CallState::ClosedWon;
        if fully_refunded_close {
            // Closed-Won is terminal in the table; the reversion is a
            // deliberate direct write.
            patch.attendance = Some(CallState::Lost);
            patch.call_outcome = Some(CallOutcome::Lost);
            patch.lost_reason = Some(format!(
                "{} of ${amount:.2}",
                event.payment_type.key()
            ));
        }
        self.warehouse.update_call(tenant_id, call_id, &patch).await?;

        if fully_refunded_close {
            self.audit
                .record(
                    AuditEntry::new(
                        tenant_id,
                        "call",
                        call_id,
                        AuditAction::StateChange,
                        TriggerSource::PaymentWebhook,
                    )
                    .with_change(
                        "attendance",
                        CallState::ClosedWon.label(),
                        CallState::Lost.label(),
                    )
                    .with_detail(event.payment_type.key()),
                )
                .await;
        }
        self.payment_audit(
            tenant_id,
            "call",
            call_id,
            AuditAction::PaymentReceived,
            event,
            serde_json::json!({ "amount": -amount, "cash_collected": new_cash }),
        )
        .await;

        if event.payment_type == PaymentType::Chargeback {
            self.alerts
                .send(
                    Alert::new(
                        AlertSeverity::High,
                        "chargeback received",
                        &format!("chargeback of ${amount:.2} against call {call_id}"),
                    )
                    .tenant(tenant_id)
                    .action("review the dispute with the payment processor"),
                )
                .await;
        }
        Ok(PaymentAction::Refund)
    }

    async fn upsert_prospect(
        &self,
        tenant_id: &str,
        email: &str,
        event: &PaymentEvent,
        amount: f64,
        payment_date: &str,
        reversal: bool,
    ) -> Result<()> {
        let mut prospect = match self.warehouse.find_prospect(tenant_id, email).await? {
            Some(p) => p,
            None => {
                let p = Prospect::new(tenant_id, email);
                self.warehouse.insert_prospect(tenant_id, &p).await?;
                p
            }
        };
        if prospect.name.is_none() {
            prospect.name = event.prospect_name.clone();
        }
        if reversal {
            prospect.total_cash_collected = (prospect.total_cash_collected - amount).max(0.0);
            prospect.total_revenue = (prospect.total_revenue - amount).max(0.0);
        } else {
            prospect.total_cash_collected += amount;
            prospect.total_revenue += amount;
        }
        prospect.payment_count += 1;
        prospect.last_payment_date = Some(payment_date.to_string());
        prospect.updated_at = Utc::now();
        self.warehouse.update_prospect(tenant_id, &prospect).await
    }

    async fn payment_audit(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
        action: AuditAction,
        event: &PaymentEvent,
        metadata: serde_json::Value,
    ) {
        self.audit
            .record(
                AuditEntry::new(
                    tenant_id,
                    entity_type,
                    entity_id,
                    action,
                    TriggerSource::PaymentWebhook,
                )
                .with_detail(event.payment_type.key())
                .with_metadata(metadata),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cs_domain::call::Call;
    use cs_domain::tenant::{Closer, Tenant};
    use cs_warehouse::MemoryWarehouse;

    use crate::alerts::RecordingAlertSink;

    fn processor(
        warehouse: Arc<MemoryWarehouse>,
    ) -> (PaymentProcessor, Arc<RecordingAlertSink>) {
        let audit = Arc::new(AuditWriter::new(warehouse.clone()));
        let alerts = RecordingAlertSink::new();
        let machine = Arc::new(StateMachine::new(warehouse.clone(), audit.clone()));
        (
            PaymentProcessor::new(warehouse, machine, audit, alerts.clone()),
            alerts,
        )
    }

    async fn seed_call(warehouse: &MemoryWarehouse, state: CallState) -> (Tenant, Call) {
        let tenant = Tenant::new("friends_inc");
        warehouse.insert_tenant(&tenant).await.unwrap();
        let closer = Closer::new(&tenant.id, "Sarah Lane", "sarah@x.com");
        warehouse.insert_closer(&tenant.id, &closer).await.unwrap();
        let mut call = Call::new(
            &tenant.id,
            &closer.id,
            "evt1",
            "2026-02-20T20:00:00Z",
            Some("2026-02-20T21:00:00Z"),
            "UTC",
        );
        call.prospect_email = "john@ex.com".into();
        call.attendance = state;
        call.call_outcome = CallOutcome::from_state(state);
        warehouse.insert_call(&tenant.id, &call).await.unwrap();
        (tenant, call)
    }

    fn payment(amount: f64, payment_type: PaymentType) -> PaymentEvent {
        PaymentEvent {
            prospect_email: "John@Ex.com".into(),
            prospect_name: Some("John Smith".into()),
            amount,
            payment_date: Some("2026-02-21".into()),
            payment_type,
            product_name: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn payment_closes_follow_up_call() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let (tenant, call) = seed_call(&warehouse, CallState::FollowUp).await;
        let (processor, _) = processor(warehouse.clone());

        let action = processor
            .process(&tenant.id, &payment(10_000.0, PaymentType::Full))
            .await
            .unwrap();
        assert_eq!(action, PaymentAction::NewClose);

        let c = warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
        assert_eq!(c.attendance, CallState::ClosedWon);
        assert_eq!(c.call_outcome, Some(CallOutcome::ClosedWon));
        assert_eq!(c.cash_collected, 10_000.0);
        assert_eq!(c.revenue_generated, 10_000.0);
        assert_eq!(c.payment_plan.as_deref(), Some("Full"));
        assert_eq!(c.date_closed.as_deref(), Some("2026-02-21"));

        let p = warehouse.find_prospect(&tenant.id, "john@ex.com").await.unwrap().unwrap();
        assert_eq!(p.total_cash_collected, 10_000.0);
        assert_eq!(p.payment_count, 1);
        assert_eq!(p.name.as_deref(), Some("John Smith"));
    }

    #[tokio::test]
    async fn deposit_completion_uses_full_payment_trigger() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let (tenant, call) = seed_call(&warehouse, CallState::Deposit).await;
        let (processor, _) = processor(warehouse.clone());

        let action = processor
            .process(&tenant.id, &payment(8_000.0, PaymentType::Full))
            .await
            .unwrap();
        assert_eq!(action, PaymentAction::NewClose);
        let c = warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
        assert_eq!(c.attendance, CallState::ClosedWon);
        let audit = warehouse.audit_for_entity(&call.id).await;
        assert!(audit
            .iter()
            .any(|a| a.trigger_detail.as_deref() == Some("payment_received_full")));
    }

    #[tokio::test]
    async fn additional_payment_on_closed_won() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let (tenant, call) = seed_call(&warehouse, CallState::ClosedWon).await;
        warehouse
            .update_call(
                &tenant.id,
                &call.id,
                &CallPatch {
                    cash_collected: Some(5_000.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let (processor, _) = processor(warehouse.clone());

        let action = processor
            .process(&tenant.id, &payment(2_500.0, PaymentType::PaymentPlan))
            .await
            .unwrap();
        assert_eq!(action, PaymentAction::AdditionalPayment);
        let c = warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
        assert_eq!(c.cash_collected, 7_500.0);
        assert_eq!(c.attendance, CallState::ClosedWon, "outcome untouched");
    }

    #[tokio::test]
    async fn full_refund_reverts_close_to_lost() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let (tenant, call) = seed_call(&warehouse, CallState::ClosedWon).await;
        warehouse
            .update_call(
                &tenant.id,
                &call.id,
                &CallPatch {
                    cash_collected: Some(10_000.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let (processor, _) = processor(warehouse.clone());

        let action = processor
            .process(&tenant.id, &payment(10_000.0, PaymentType::Refund))
            .await
            .unwrap();
        assert_eq!(action, PaymentAction::Refund);
        let c = warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
        assert_eq!(c.cash_collected, 0.0);
        assert_eq!(c.attendance, CallState::Lost);
        assert_eq!(c.call_outcome, Some(CallOutcome::Lost));
        assert!(c.lost_reason.as_deref().unwrap().contains("refund"));

        // Refund symmetry: paying again re-closes the deal.
        let action = processor
            .process(&tenant.id, &payment(10_000.0, PaymentType::Full))
            .await
            .unwrap();
        assert_eq!(action, PaymentAction::NewClose);
        let c = warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
        assert_eq!(c.attendance, CallState::ClosedWon);
        assert_eq!(c.cash_collected, 10_000.0);
    }

    #[tokio::test]
    async fn partial_refund_keeps_close() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let (tenant, call) = seed_call(&warehouse, CallState::ClosedWon).await;
        warehouse
            .update_call(
                &tenant.id,
                &call.id,
                &CallPatch {
                    cash_collected: Some(10_000.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let (processor, _) = processor(warehouse.clone());

        processor
            .process(&tenant.id, &payment(4_000.0, PaymentType::Refund))
            .await
            .unwrap();
        let c = warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
        assert_eq!(c.cash_collected, 6_000.0);
        assert_eq!(c.attendance, CallState::ClosedWon);
    }

    #[tokio::test]
    async fn chargeback_emits_high_alert() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let (tenant, call) = seed_call(&warehouse, CallState::ClosedWon).await;
        warehouse
            .update_call(
                &tenant.id,
                &call.id,
                &CallPatch {
                    cash_collected: Some(3_000.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let (processor, alerts) = processor(warehouse.clone());

        processor
            .process(&tenant.id, &payment(3_000.0, PaymentType::Chargeback))
            .await
            .unwrap();
        assert_eq!(alerts.count(AlertSeverity::High), 1);
        let c = warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
        assert!(c.lost_reason.as_deref().unwrap().contains("chargeback"));
    }

    #[tokio::test]
    async fn no_matching_call_records_payment_only() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let tenant = Tenant::new("friends_inc");
        warehouse.insert_tenant(&tenant).await.unwrap();
        let (processor, _) = processor(warehouse.clone());

        let action = processor
            .process(&tenant.id, &payment(500.0, PaymentType::Full))
            .await
            .unwrap();
        assert_eq!(action, PaymentAction::PaymentRecorded);
        let p = warehouse.find_prospect(&tenant.id, "john@ex.com").await.unwrap().unwrap();
        assert_eq!(p.total_cash_collected, 500.0);
    }

    #[tokio::test]
    async fn disqualified_close_falls_back_to_direct_write() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let (tenant, call) = seed_call(&warehouse, CallState::Disqualified).await;
        let (processor, _) = processor(warehouse.clone());

        let action = processor
            .process(&tenant.id, &payment(1_000.0, PaymentType::Full))
            .await
            .unwrap();
        assert_eq!(action, PaymentAction::NewClose);
        let c = warehouse.get_call(&tenant.id, &call.id).await.unwrap().unwrap();
        assert_eq!(c.attendance, CallState::ClosedWon, "direct write applied");
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let tenant = Tenant::new("friends_inc");
        warehouse.insert_tenant(&tenant).await.unwrap();
        let (processor, _) = processor(warehouse.clone());
        assert!(processor
            .process(&tenant.id, &payment(0.0, PaymentType::Full))
            .await
            .is_err());
    }
}
