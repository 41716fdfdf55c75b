//! # Endpoint Registry
//!
//! Authoritative set of configured endpoints and their health state.
//! Readers never block each other: the registry holds an immutable
//! `Arc<Vec<Endpoint>>` snapshot behind a `tokio::sync::RwLock`, and writers
//! (config load, health prober) replace the whole snapshot rather than
//! mutating in place.

use crate::endpoint::{Endpoint, EndpointStatus};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared, cloneable handle to the endpoint set.
#[derive(Clone)]
pub struct EndpointRegistry {
    inner: Arc<RwLock<Arc<Vec<Endpoint>>>>,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(Vec::new()))),
        }
    }

    /// All configured endpoints, regardless of health.
    pub async fn get_all(&self) -> Arc<Vec<Endpoint>> {
        self.inner.read().await.clone()
    }

    /// Endpoints currently `Healthy`.
    pub async fn get_healthy(&self) -> Vec<Endpoint> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|e| e.status == EndpointStatus::Healthy)
            .cloned()
            .collect()
    }

    /// Endpoints currently routable (`Healthy`, `Busy`, or `Warming`).
    pub async fn get_routable(&self) -> Vec<Endpoint> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|e| e.is_routable())
            .cloned()
            .collect()
    }

    pub async fn exists(&self, url: &str) -> bool {
        self.inner.read().await.iter().any(|e| e.url == url)
    }

    pub async fn get_by_url(&self, url: &str) -> Option<Endpoint> {
        self.inner
            .read()
            .await
            .iter()
            .find(|e| e.url == url)
            .cloned()
    }

    /// Atomically replace the endpoint set. Endpoints whose
    /// `(name, url, provider)` identity is unchanged keep their health
    /// state; everything else starts at `Unknown`. Removed endpoints are
    /// dropped.
    pub async fn load_from_config(&self, configs: Vec<Endpoint>) {
        let previous = self.inner.read().await.clone();
        let mut next = Vec::with_capacity(configs.len());
        for mut incoming in configs {
            if let Some(existing) = previous
                .iter()
                .find(|e| e.identity() == incoming.identity())
            {
                incoming.status = existing.status;
                incoming.last_checked = existing.last_checked;
                incoming.last_latency_ms = existing.last_latency_ms;
                incoming.consecutive_failures = existing.consecutive_failures;
                incoming.backoff_multiplier = existing.backoff_multiplier;
                incoming.next_check_time = existing.next_check_time;
                incoming.warming_since = existing.warming_since;
            }
            next.push(incoming);
        }
        *self.inner.write().await = Arc::new(next);
    }

    /// Called by the health prober (or the proxy engine's busy-threshold
    /// logic) to publish a new state for one endpoint. Safe against
    /// concurrent readers: the whole snapshot is cloned, mutated, and
    /// swapped back.
    pub async fn update_endpoint(&self, updated: Endpoint) {
        let mut guard = self.inner.write().await;
        let mut next = (**guard).clone();
        if let Some(slot) = next.iter_mut().find(|e| e.url == updated.url) {
            *slot = updated;
        } else {
            next.push(updated);
        }
        *guard = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::ProviderKind;

    fn ep(name: &str, url: &str) -> Endpoint {
        Endpoint::new(name, url, ProviderKind::Ollama)
    }

    #[tokio::test]
    async fn load_from_config_returns_exactly_the_new_set() {
        let reg = EndpointRegistry::new();
        reg.load_from_config(vec![ep("a", "http://a"), ep("b", "http://b")])
            .await;
        let all = reg.get_all().await;
        assert_eq!(all.len(), 2);

        reg.load_from_config(vec![ep("c", "http://c")]).await;
        let all = reg.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "c");
    }

    #[tokio::test]
    async fn reload_preserves_health_state_for_unchanged_identity() {
        let reg = EndpointRegistry::new();
        reg.load_from_config(vec![ep("a", "http://a")]).await;

        let mut healthy = ep("a", "http://a");
        healthy.status = EndpointStatus::Healthy;
        healthy.consecutive_failures = 0;
        reg.update_endpoint(healthy).await;

        reg.load_from_config(vec![ep("a", "http://a"), ep("b", "http://b")])
            .await;
        let all = reg.get_all().await;
        let a = all.iter().find(|e| e.name == "a").unwrap();
        assert_eq!(a.status, EndpointStatus::Healthy);
        let b = all.iter().find(|e| e.name == "b").unwrap();
        assert_eq!(b.status, EndpointStatus::Unknown);
    }

    #[tokio::test]
    async fn get_routable_excludes_unknown_and_unhealthy() {
        let reg = EndpointRegistry::new();
        reg.load_from_config(vec![ep("a", "http://a"), ep("b", "http://b")])
            .await;
        let mut healthy = ep("a", "http://a");
        healthy.status = EndpointStatus::Healthy;
        reg.update_endpoint(healthy).await;

        let routable = reg.get_routable().await;
        assert_eq!(routable.len(), 1);
        assert_eq!(routable[0].name, "a");
    }
}
