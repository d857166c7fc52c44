//! Operational alerts.
//!
//! Severity decides the route: critical and high dispatch synchronously to
//! the configured webhook, medium accumulates into a daily digest buffer,
//! low is log-only. Alert dispatch is always fire-and-forget; nothing in
//! the engine blocks on it.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Alert model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub title: String,
    pub details: String,
    pub tenant_id: Option<String>,
    pub error: Option<String>,
    pub suggested_action: Option<String>,
}

impl Alert {
    pub fn new(severity: AlertSeverity, title: &str, details: &str) -> Self {
        Self {
            severity,
            title: title.to_string(),
            details: details.to_string(),
            tenant_id: None,
            error: None,
            suggested_action: None,
        }
    }

    pub fn tenant(mut self, tenant_id: &str) -> Self {
        self.tenant_id = Some(tenant_id.to_string());
        self
    }

    pub fn error(mut self, error: impl std::fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn action(mut self, action: &str) -> Self {
        self.suggested_action = Some(action.to_string());
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: Alert);
}

/// Routes by severity: critical/high to the webhook, medium to the digest
/// buffer, low to the log.
pub struct WebhookAlertSink {
    webhook_url: Option<String>,
    client: reqwest::Client,
    digest: Mutex<Vec<Alert>>,
}

impl WebhookAlertSink {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
            digest: Mutex::new(Vec::new()),
        }
    }

    /// Drain the medium-severity digest buffer. Called by the daily digest
    /// job.
    pub fn drain_digest(&self) -> Vec<Alert> {
        std::mem::take(&mut self.digest.lock())
    }

    fn dispatch_webhook(&self, alert: &Alert) {
        let Some(url) = self.webhook_url.clone() else {
            tracing::error!(
                severity = ?alert.severity,
                title = %alert.title,
                details = %alert.details,
                "alert (no webhook configured)"
            );
            return;
        };
        let client = self.client.clone();
        let payload = serde_json::json!(alert);
        let title = alert.title.clone();
        // Fire-and-forget: alerting never blocks or fails the operation.
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&payload).send().await {
                tracing::warn!(title = %title, error = %e, "alert webhook dispatch failed");
            }
        });
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send(&self, alert: Alert) {
        match alert.severity {
            AlertSeverity::Critical | AlertSeverity::High => {
                tracing::error!(
                    severity = ?alert.severity,
                    title = %alert.title,
                    tenant = ?alert.tenant_id,
                    details = %alert.details,
                    "alert"
                );
                self.dispatch_webhook(&alert);
            }
            AlertSeverity::Medium => {
                tracing::warn!(
                    title = %alert.title,
                    tenant = ?alert.tenant_id,
                    details = %alert.details,
                    "alert (batched into daily digest)"
                );
                self.digest.lock().push(alert);
            }
            AlertSeverity::Low => {
                tracing::info!(
                    title = %alert.title,
                    tenant = ?alert.tenant_id,
                    details = %alert.details,
                    "alert"
                );
            }
        }
    }
}

/// Records alerts in memory; the test double.
#[derive(Default)]
pub struct RecordingAlertSink {
    pub alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self, severity: AlertSeverity) -> usize {
        self.alerts
            .lock()
            .iter()
            .filter(|a| a.severity == severity)
            .count()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn send(&self, alert: Alert) {
        self.alerts.lock().push(alert);
    }
}
