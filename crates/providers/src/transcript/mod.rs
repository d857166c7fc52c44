//! Transcript provider seam.
//!
//! [`TranscriptAdapter`] normalizes webhook payloads; [`TranscriptPullApi`]
//! is the optional tier-1 surface (webhook registration + catch-up listing)
//! the sweeper and closer lifecycle consume. Providers that only push
//! implement the adapter alone.

pub mod fathom;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use cs_domain::error::Result;
use cs_domain::event::CanonicalTranscript;
use cs_domain::tenant::Closer;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of normalizing one webhook payload.
pub enum Normalized {
    /// A full transcript, ready for matching and evaluation.
    Transcript(Box<CanonicalTranscript>),
    /// The provider sent metadata before the transcript was ready; the
    /// sweeper pulls the meeting later.
    MetadataOnly { meeting_id: String },
}

pub trait TranscriptAdapter: Send + Sync {
    fn provider_key(&self) -> &'static str;
    fn normalize(&self, raw: &Value) -> Result<Normalized>;
}

/// A provider-side webhook registered for one closer.
#[derive(Debug, Clone)]
pub struct RegisteredWebhook {
    pub id: String,
    pub secret: String,
}

/// Tier-1 provider surface: listing for catch-up polling plus webhook
/// registration. Credentials come from the closer record.
#[async_trait]
pub trait TranscriptPullApi: Send + Sync {
    fn provider_key(&self) -> &'static str;

    /// Raw meetings recorded by this closer since `since`.
    async fn list_meetings_since(
        &self,
        closer: &Closer,
        since: DateTime<Utc>,
    ) -> Result<Vec<Value>>;

    async fn register_webhook(
        &self,
        closer: &Closer,
        callback_url: &str,
    ) -> Result<RegisteredWebhook>;

    async fn delete_webhook(&self, closer: &Closer, webhook_id: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Adapters and pull clients keyed by provider key.
pub struct TranscriptRegistry {
    adapters: HashMap<String, Arc<dyn TranscriptAdapter>>,
    pull_apis: HashMap<String, Arc<dyn TranscriptPullApi>>,
}

impl TranscriptRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            pull_apis: HashMap::new(),
        }
    }

    /// Registry with every built-in provider.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_adapter(Arc::new(fathom::FathomAdapter));
        registry.register_pull_api(Arc::new(fathom::FathomClient::new()));
        registry
    }

    pub fn register_adapter(&mut self, adapter: Arc<dyn TranscriptAdapter>) {
        tracing::info!(provider = adapter.provider_key(), "registered transcript adapter");
        self.adapters
            .insert(adapter.provider_key().to_string(), adapter);
    }

    pub fn register_pull_api(&mut self, api: Arc<dyn TranscriptPullApi>) {
        self.pull_apis.insert(api.provider_key().to_string(), api);
    }

    pub fn adapter(&self, provider_key: &str) -> Option<Arc<dyn TranscriptAdapter>> {
        self.adapters.get(provider_key).cloned()
    }

    /// Pull surface for a provider, when it has one.
    pub fn pull_api(&self, provider_key: &str) -> Option<Arc<dyn TranscriptPullApi>> {
        self.pull_apis.get(provider_key).cloned()
    }
}

impl Default for TranscriptRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_include_fathom_with_pull_support() {
        let registry = TranscriptRegistry::with_builtins();
        assert!(registry.adapter("fathom").is_some());
        assert!(registry.pull_api("fathom").is_some());
        assert!(registry.adapter("fireflies").is_none());
    }
}
