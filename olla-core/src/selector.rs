//! # Endpoint Selectors
//!
//! Strategies for picking one endpoint from a routable candidate set.
//! Grounded on the teacher's `routing.rs::Router` (`select_round_robin_provider`,
//! `select_least_used_provider`, `select_weighted_provider`), re-targeted
//! from "pick a provider name" to "pick a routable `Endpoint`".

use crate::endpoint::Endpoint;
use crate::error::CoreError;
use crate::stats::StatsCollector;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared contract for all selector strategies.
pub trait Selector: Send + Sync {
    fn select(&self, routable: &[Endpoint]) -> Result<Endpoint, CoreError>;
}

/// Highest-`priority` tier first; within the tier, weighted-random by
/// `traffic_weight()`. Falls back to uniform random within the tier if all
/// weights are zero. Never descends to a lower tier unless the higher tier
/// is empty.
#[derive(Default)]
pub struct PrioritySelector;

impl Selector for PrioritySelector {
    fn select(&self, routable: &[Endpoint]) -> Result<Endpoint, CoreError> {
        if routable.is_empty() {
            return Err(CoreError::NoRoutableEndpoints);
        }
        let top_priority = routable.iter().map(|e| e.priority).max().unwrap();
        let tier: Vec<&Endpoint> = routable
            .iter()
            .filter(|e| e.priority == top_priority)
            .collect();

        let total_weight: f64 = tier.iter().map(|e| e.traffic_weight()).sum();
        let mut rng = rand::thread_rng();

        if total_weight <= 0.0 {
            let idx = rng.gen_range(0..tier.len());
            return Ok(tier[idx].clone());
        }

        let mut roll = rng.gen_range(0.0..total_weight);
        for e in &tier {
            roll -= e.traffic_weight();
            if roll <= 0.0 {
                return Ok((*e).clone());
            }
        }
        Ok(tier[tier.len() - 1].clone())
    }
}

/// Atomic counter modulo the routable slice length. Callers must pass
/// endpoints in a stable, deterministic order (e.g. sorted by name) for
/// round-robin to actually rotate rather than jitter.
pub struct RoundRobinSelector {
    counter: AtomicUsize,
}

impl Default for RoundRobinSelector {
    fn default() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Selector for RoundRobinSelector {
    fn select(&self, routable: &[Endpoint]) -> Result<Endpoint, CoreError> {
        if routable.is_empty() {
            return Err(CoreError::NoRoutableEndpoints);
        }
        let mut sorted: Vec<&Endpoint> = routable.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % sorted.len();
        Ok(sorted[idx].clone())
    }
}

/// Picks the endpoint with the fewest active connections (from the stats
/// collector); ties broken by lower last-observed latency, then by stable
/// name order.
pub struct LeastConnectionsSelector {
    stats: StatsCollector,
}

impl LeastConnectionsSelector {
    pub fn new(stats: StatsCollector) -> Self {
        Self { stats }
    }
}

impl Selector for LeastConnectionsSelector {
    fn select(&self, routable: &[Endpoint]) -> Result<Endpoint, CoreError> {
        if routable.is_empty() {
            return Err(CoreError::NoRoutableEndpoints);
        }
        let mut candidates: Vec<&Endpoint> = routable.iter().collect();
        candidates.sort_by(|a, b| {
            let conn_a = self.stats.active_connections(&a.url);
            let conn_b = self.stats.active_connections(&b.url);
            conn_a
                .cmp(&conn_b)
                .then_with(|| a.last_latency_ms.unwrap_or(0).cmp(&b.last_latency_ms.unwrap_or(0)))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(candidates[0].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::ProviderKind;

    fn ep(name: &str, priority: i32) -> Endpoint {
        let mut e = Endpoint::new(name, format!("http://{name}"), ProviderKind::Ollama)
            .with_priority(priority);
        e.status = crate::endpoint::EndpointStatus::Healthy;
        e
    }

    #[test]
    fn priority_selector_never_skips_to_lower_tier_unless_empty() {
        let sel = PrioritySelector;
        let high = ep("high", 100);
        let low = ep("low", 50);
        for _ in 0..20 {
            let picked = sel.select(&[high.clone(), low.clone()]).unwrap();
            assert_eq!(picked.name, "high");
        }
    }

    #[test]
    fn priority_selector_falls_back_to_lower_tier_when_top_empty() {
        let sel = PrioritySelector;
        let low = ep("low", 50);
        let picked = sel.select(&[low.clone()]).unwrap();
        assert_eq!(picked.name, "low");
    }

    #[test]
    fn priority_selector_never_chooses_offline_peer_at_equal_priority() {
        let sel = PrioritySelector;
        let healthy = ep("healthy", 100);
        let mut offline = ep("offline", 100);
        offline.status = crate::endpoint::EndpointStatus::Offline;
        // Offline is not routable so it should never be in the candidate
        // set passed to select(); this asserts the selector itself doesn't
        // need to special-case it when given a pre-filtered routable set.
        for _ in 0..20 {
            let picked = sel.select(&[healthy.clone()]).unwrap();
            assert_eq!(picked.name, "healthy");
        }
    }

    #[test]
    fn round_robin_rotates_in_stable_order() {
        let sel = RoundRobinSelector::default();
        let a = ep("a", 0);
        let b = ep("b", 0);
        let first = sel.select(&[a.clone(), b.clone()]).unwrap();
        let second = sel.select(&[a.clone(), b.clone()]).unwrap();
        assert_ne!(first.name, second.name);
    }

    #[test]
    fn empty_routable_set_is_an_error() {
        let sel = PrioritySelector;
        assert!(sel.select(&[]).is_err());
        let rr = RoundRobinSelector::default();
        assert!(rr.select(&[]).is_err());
    }

    #[test]
    fn least_connections_picks_fewest_active() {
        let stats = StatsCollector::new(Default::default());
        stats.record_connection("http://busy", 5);
        stats.record_connection("http://idle", 0);
        let sel = LeastConnectionsSelector::new(stats);
        let busy = ep("busy", 0);
        let idle = ep("idle", 0);
        let picked = sel.select(&[busy, idle]).unwrap();
        assert_eq!(picked.name, "idle");
    }
}
