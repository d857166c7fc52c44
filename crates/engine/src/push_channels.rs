//! Push-channel lifecycle.
//!
//! One active calendar watch subscription per active closer. The registry
//! is in-memory for now; the contract stays the same when it moves to a
//! durable store. The channel token carries the tenant id so notifications
//! identify their tenant from headers alone.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use cs_domain::config::PushConfig;
use cs_domain::error::Result;
use cs_domain::tenant::Closer;
use cs_providers::calendar::CalendarApi;
use cs_warehouse::Warehouse;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct PushSubscription {
    pub channel_id: String,
    pub resource_id: String,
    pub expiry: DateTime<Utc>,
    pub closer_id: String,
    pub tenant_id: String,
}

/// Subscriptions keyed by closer id.
#[derive(Default)]
pub struct PushChannelRegistry {
    inner: RwLock<HashMap<String, PushSubscription>>,
}

impl PushChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, closer_id: &str) -> Option<PushSubscription> {
        self.inner.read().await.get(closer_id).cloned()
    }

    pub async fn insert(&self, sub: PushSubscription) {
        self.inner.write().await.insert(sub.closer_id.clone(), sub);
    }

    pub async fn remove(&self, closer_id: &str) -> Option<PushSubscription> {
        self.inner.write().await.remove(closer_id)
    }

    /// Subscriptions expiring before `cutoff`.
    pub async fn expiring_before(&self, cutoff: DateTime<Utc>) -> Vec<PushSubscription> {
        self.inner
            .read()
            .await
            .values()
            .filter(|s| s.expiry <= cutoff)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PushChannelManager {
    registry: Arc<PushChannelRegistry>,
    api: Arc<dyn CalendarApi>,
    warehouse: Arc<dyn Warehouse>,
    callback_url: String,
    config: PushConfig,
}

impl PushChannelManager {
    pub fn new(
        registry: Arc<PushChannelRegistry>,
        api: Arc<dyn CalendarApi>,
        warehouse: Arc<dyn Warehouse>,
        callback_url: String,
        config: PushConfig,
    ) -> Self {
        Self {
            registry,
            api,
            warehouse,
            callback_url,
            config,
        }
    }

    /// Register a new watch channel for a closer's calendar.
    pub async fn create(&self, tenant_id: &str, closer: &Closer) -> Result<PushSubscription> {
        let channel_id = Uuid::new_v4().to_string();
        let channel = self
            .api
            .create_watch(closer, &channel_id, tenant_id, &self.callback_url)
            .await?;
        let sub = PushSubscription {
            channel_id: channel.channel_id,
            resource_id: channel.resource_id,
            expiry: channel.expiry,
            closer_id: closer.id.clone(),
            tenant_id: tenant_id.to_string(),
        };
        self.registry.insert(sub.clone()).await;
        tracing::info!(
            tenant = %tenant_id,
            closer = %closer.id,
            channel = %sub.channel_id,
            expiry = %sub.expiry,
            "push channel created"
        );
        Ok(sub)
    }

    /// Stop a closer's subscription. A missing or already-expired channel
    /// counts as success.
    pub async fn stop(&self, closer_id: &str) -> Result<()> {
        let Some(sub) = self.registry.remove(closer_id).await else {
            return Ok(());
        };
        self.api.stop_watch(&sub.channel_id, &sub.resource_id).await?;
        tracing::info!(closer = %closer_id, channel = %sub.channel_id, "push channel stopped");
        Ok(())
    }

    /// Stop then create a replacement.
    pub async fn renew(&self, tenant_id: &str, closer: &Closer) -> Result<PushSubscription> {
        self.stop(&closer.id).await?;
        self.create(tenant_id, closer).await
    }

    /// Renew every subscription expiring within the configured lookahead.
    /// Called on a periodic interval; per-subscription failures are logged
    /// and skipped.
    pub async fn renew_expiring(&self) -> usize {
        let cutoff = Utc::now() + Duration::hours(self.config.renewal_lookahead_hours);
        let expiring = self.registry.expiring_before(cutoff).await;
        let mut renewed = 0;
        for sub in expiring {
            let closer = match self.warehouse.get_closer(&sub.tenant_id, &sub.closer_id).await {
                Ok(Some(c)) if c.is_active() => c,
                Ok(_) => {
                    // Closer gone or deactivated; drop the registration.
                    self.registry.remove(&sub.closer_id).await;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(closer = %sub.closer_id, error = %e, "renewal closer lookup failed");
                    continue;
                }
            };
            match self.renew(&sub.tenant_id, &closer).await {
                Ok(_) => renewed += 1,
                Err(e) => {
                    tracing::warn!(
                        closer = %sub.closer_id,
                        channel = %sub.channel_id,
                        error = %e,
                        "push channel renewal failed"
                    );
                }
            }
        }
        if renewed > 0 {
            tracing::info!(renewed, "push channel renewal pass complete");
        }
        renewed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cs_domain::tenant::Tenant;
    use cs_providers::calendar::WatchChannel;
    use cs_warehouse::MemoryWarehouse;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeCalendarApi {
        watches: AtomicUsize,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl CalendarApi for FakeCalendarApi {
        async fn list_changed_events(
            &self,
            _closer: &Closer,
            _since: DateTime<Utc>,
        ) -> Result<Vec<Value>> {
            Ok(vec![])
        }

        async fn create_watch(
            &self,
            _closer: &Closer,
            channel_id: &str,
            _token: &str,
            _callback_url: &str,
        ) -> Result<WatchChannel> {
            self.watches.fetch_add(1, Ordering::SeqCst);
            Ok(WatchChannel {
                channel_id: channel_id.to_string(),
                resource_id: "res_1".into(),
                expiry: Utc::now() + Duration::days(7),
            })
        }

        async fn stop_watch(&self, _channel_id: &str, _resource_id: &str) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn manager() -> (PushChannelManager, Arc<FakeCalendarApi>, Tenant, Closer) {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let tenant = Tenant::new("friends_inc");
        warehouse.insert_tenant(&tenant).await.unwrap();
        let closer = Closer::new(&tenant.id, "Sarah Lane", "sarah@x.com");
        warehouse.insert_closer(&tenant.id, &closer).await.unwrap();
        let api = Arc::new(FakeCalendarApi::default());
        let manager = PushChannelManager::new(
            Arc::new(PushChannelRegistry::new()),
            api.clone(),
            warehouse,
            "https://example.test/webhooks/calendar".into(),
            PushConfig::default(),
        );
        (manager, api, tenant, closer)
    }

    #[tokio::test]
    async fn create_registers_one_subscription_per_closer() {
        let (manager, api, tenant, closer) = manager().await;
        manager.create(&tenant.id, &closer).await.unwrap();
        assert_eq!(manager.registry.len().await, 1);
        assert_eq!(api.watches.load(Ordering::SeqCst), 1);
        // Renewal replaces rather than accumulates.
        manager.renew(&tenant.id, &closer).await.unwrap();
        assert_eq!(manager.registry.len().await, 1);
        assert_eq!(api.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_without_subscription_is_success() {
        let (manager, api, _, _) = manager().await;
        manager.stop("nobody").await.unwrap();
        assert_eq!(api.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn renew_expiring_renews_within_lookahead_only() {
        let (manager, _, tenant, closer) = manager().await;
        let sub = manager.create(&tenant.id, &closer).await.unwrap();
        // Force the stored expiry inside the 24h lookahead.
        manager
            .registry
            .insert(PushSubscription {
                expiry: Utc::now() + Duration::hours(2),
                ..sub
            })
            .await;
        assert_eq!(manager.renew_expiring().await, 1);
        let renewed = manager.registry.get(&closer.id).await.unwrap();
        assert!(renewed.expiry > Utc::now() + Duration::days(6));
    }
}
