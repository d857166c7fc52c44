//! Calendar provider seam.
//!
//! Two capabilities, deliberately separate: [`CalendarAdapter`] is pure
//! normalization (raw provider JSON → canonical event), [`CalendarApi`] is
//! the outbound HTTP surface (delta listing, watch channels). The
//! orchestrator composes both through the registry so a new provider is one
//! adapter + one client + one `register` call.

pub mod google;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use cs_domain::error::Result;
use cs_domain::event::CanonicalCalendarEvent;
use cs_domain::tenant::Closer;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pure normalization from one provider's raw event shape.
pub trait CalendarAdapter: Send + Sync {
    fn provider_key(&self) -> &'static str;

    /// Normalize a raw provider event. Cancelled events often arrive with
    /// most fields stripped; adapters must still produce a canonical event
    /// carrying the id and cancelled status.
    fn normalize(&self, raw: &Value) -> Result<CanonicalCalendarEvent>;

    /// Attendee emails that declined, from the raw payload.
    fn extract_declined_attendees(&self, raw: &Value) -> Vec<String>;
}

/// A watch channel registered with the provider for one closer's calendar.
#[derive(Debug, Clone)]
pub struct WatchChannel {
    pub channel_id: String,
    pub resource_id: String,
    pub expiry: DateTime<Utc>,
}

/// Outbound calendar API: delta listing and push-channel management.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// Raw changed events on the closer's calendar since `since`, including
    /// deleted ones.
    async fn list_changed_events(
        &self,
        closer: &Closer,
        since: DateTime<Utc>,
    ) -> Result<Vec<Value>>;

    /// Register a watch channel delivering push notifications to
    /// `callback_url`. `token` is echoed back on every notification and
    /// carries the tenant id.
    async fn create_watch(
        &self,
        closer: &Closer,
        channel_id: &str,
        token: &str,
        callback_url: &str,
    ) -> Result<WatchChannel>;

    /// Stop a watch channel. Providers treat unknown/expired channels as
    /// already stopped; implementations map that to `Ok`.
    async fn stop_watch(&self, channel_id: &str, resource_id: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Adapter registry keyed by provider key.
pub struct CalendarAdapterRegistry {
    adapters: HashMap<String, Arc<dyn CalendarAdapter>>,
}

impl CalendarAdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registry with every built-in adapter.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(google::GoogleCalendarAdapter));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn CalendarAdapter>) {
        tracing::info!(provider = adapter.provider_key(), "registered calendar adapter");
        self.adapters
            .insert(adapter.provider_key().to_string(), adapter);
    }

    pub fn get(&self, provider_key: &str) -> Option<Arc<dyn CalendarAdapter>> {
        self.adapters.get(provider_key).cloned()
    }
}

impl Default for CalendarAdapterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_dispatches_google() {
        let registry = CalendarAdapterRegistry::with_builtins();
        assert!(registry.get("google").is_some());
        assert!(registry.get("outlook").is_none());
    }
}
