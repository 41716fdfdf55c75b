//! # Stats Collector
//!
//! Lock-free per-endpoint and global counters. Grounded on the teacher's
//! `metrics.rs::MetricsCollector` for the cleanup-task/retention shape,
//! reimplemented with `AtomicU64`/`AtomicI64` per-endpoint counters (per
//! spec.md §4.6's lock-free requirement — the teacher's own collector is
//! `RwLock`-guarded) and `DashMap` only for the outer endpoint→counters map,
//! matching the `DashMap` idiom the teacher uses in `cache.rs`.
//!
//! Contract: counter reads are eventually consistent. No cross-counter
//! atomicity is guaranteed — callers must tolerate slight skew between,
//! e.g., `total` and `successful + failed`.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(with = "crate::common::duration_serde")]
    pub cleanup_interval: Duration,
    #[serde(with = "crate::common::duration_serde")]
    pub endpoint_ttl: Duration,
    pub max_tracked_endpoints: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(300),
            endpoint_ttl: Duration::from_secs(3600),
            max_tracked_endpoints: 50,
        }
    }
}

/// Append-only (except `active_connections` and min/max latency) per-endpoint
/// counters.
#[derive(Debug)]
pub struct EndpointData {
    pub total_requests: AtomicU64,
    pub successful_requests: AtomicU64,
    pub failed_requests: AtomicU64,
    pub total_bytes: AtomicU64,
    pub total_latency_ms: AtomicU64,
    pub min_latency_ms: AtomicU64,
    pub max_latency_ms: AtomicU64,
    pub active_connections: AtomicI64,
    last_used: parking_lot_last_used::LastUsed,
}

/// A tiny `Instant`-under-atomic-friendly-lock wrapper so `EndpointData`
/// doesn't need a whole extra crate just to record "when was this endpoint
/// last touched" for the cleanup sweep.
mod parking_lot_last_used {
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Debug)]
    pub struct LastUsed(Mutex<Instant>);

    impl LastUsed {
        pub fn now() -> Self {
            Self(Mutex::new(Instant::now()))
        }

        pub fn touch(&self) {
            *self.0.lock().unwrap() = Instant::now();
        }

        pub fn elapsed(&self) -> std::time::Duration {
            self.0.lock().unwrap().elapsed()
        }
    }
}

impl Default for EndpointData {
    fn default() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            min_latency_ms: AtomicU64::new(u64::MAX),
            max_latency_ms: AtomicU64::new(0),
            active_connections: AtomicI64::new(0),
            last_used: parking_lot_last_used::LastUsed::now(),
        }
    }
}

impl EndpointData {
    fn record_request(&self, success: bool, latency_ms: u64, bytes: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        cas_min(&self.min_latency_ms, latency_ms);
        cas_max(&self.max_latency_ms, latency_ms);
        self.last_used.touch();
    }

    fn record_connection_delta(&self, delta: i64) {
        if delta < 0 {
            // Clamp at zero: subtract only down to 0 even under races.
            let _ = self
                .active_connections
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                    Some((current + delta).max(0))
                });
        } else {
            self.active_connections.fetch_add(delta, Ordering::Relaxed);
        }
        self.last_used.touch();
    }

    pub fn mean_latency_ms(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.total_latency_ms.load(Ordering::Relaxed) as f64 / total as f64
    }
}

/// Atomic CAS loop bounded at a handful of retries; on repeated CAS
/// failure under contention we accept slight staleness rather than spin
/// forever, per spec.md §9's "lock-free min/max latency" design note.
fn cas_min(cell: &AtomicU64, value: u64) {
    let mut current = cell.load(Ordering::Relaxed);
    for _ in 0..8 {
        if value >= current {
            return;
        }
        match cell.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}

fn cas_max(cell: &AtomicU64, value: u64) {
    let mut current = cell.load(Ordering::Relaxed);
    for _ in 0..8 {
        if value <= current {
            return;
        }
        match cell.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}

/// Process-wide security counters (rate-limit/size-limit violations),
/// consumed from collaborators outside `olla-core`'s scope.
#[derive(Debug, Default)]
pub struct SecurityStats {
    violations: DashMap<String, AtomicU64>,
}

impl SecurityStats {
    fn record(&self, kind: &str) {
        self.violations
            .entry(kind.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.violations
            .get(kind)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

/// Sum across all tracked endpoints, used by `/internal/status`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GlobalStats {
    pub endpoints_tracked: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_active_connections: i64,
    pub uptime_seconds: u64,
}

/// Shared, cloneable stats handle.
#[derive(Clone)]
pub struct StatsCollector {
    inner: Arc<Inner>,
}

struct Inner {
    endpoints: DashMap<String, Arc<EndpointData>>,
    security: SecurityStats,
    config: StatsConfig,
    started_at: Instant,
}

impl StatsCollector {
    pub fn new(config: StatsConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoints: DashMap::new(),
                security: SecurityStats::default(),
                config,
                started_at: Instant::now(),
            }),
        }
    }

    fn entry(&self, endpoint: &str) -> Arc<EndpointData> {
        self.inner
            .endpoints
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(EndpointData::default()))
            .clone()
    }

    pub fn record_request(&self, endpoint: &str, success: bool, latency: Duration, bytes: u64) {
        self.entry(endpoint)
            .record_request(success, latency.as_millis() as u64, bytes);
    }

    pub fn record_connection(&self, endpoint: &str, delta: i64) {
        self.entry(endpoint).record_connection_delta(delta);
    }

    pub fn active_connections(&self, endpoint: &str) -> i64 {
        self.inner
            .endpoints
            .get(endpoint)
            .map(|e| e.active_connections.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn record_security_violation(&self, kind: &str) {
        self.inner.security.record(kind);
    }

    pub fn security_violation_count(&self, kind: &str) -> u64 {
        self.inner.security.count(kind)
    }

    pub fn endpoint_stats(&self, endpoint: &str) -> Option<Arc<EndpointData>> {
        self.inner.endpoints.get(endpoint).map(|e| e.clone())
    }

    pub fn global_stats(&self) -> GlobalStats {
        let mut total = 0;
        let mut successful = 0;
        let mut failed = 0;
        let mut active = 0;
        for entry in self.inner.endpoints.iter() {
            total += entry.total_requests.load(Ordering::Relaxed);
            successful += entry.successful_requests.load(Ordering::Relaxed);
            failed += entry.failed_requests.load(Ordering::Relaxed);
            active += entry.active_connections.load(Ordering::Relaxed);
        }
        GlobalStats {
            endpoints_tracked: self.inner.endpoints.len(),
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            total_active_connections: active,
            uptime_seconds: self.inner.started_at.elapsed().as_secs(),
        }
    }

    /// Evict endpoint entries untouched for `endpoint_ttl`, then cap the
    /// tracked set at `max_tracked_endpoints` (oldest first). Intended to
    /// be called from a periodic background task.
    pub fn cleanup(&self) {
        let ttl = self.inner.config.endpoint_ttl;
        self.inner
            .endpoints
            .retain(|_, data| data.last_used.elapsed() < ttl);

        let over = self
            .inner
            .endpoints
            .len()
            .saturating_sub(self.inner.config.max_tracked_endpoints);
        if over == 0 {
            return;
        }
        let mut by_age: Vec<(String, Duration)> = self
            .inner
            .endpoints
            .iter()
            .map(|e| (e.key().clone(), e.value().last_used.elapsed()))
            .collect();
        by_age.sort_by(|a, b| b.1.cmp(&a.1));
        for (key, _) in by_age.into_iter().take(over) {
            self.inner.endpoints.remove(&key);
        }
    }

    pub async fn run_cleanup_task(self) {
        let interval = self.inner.config.cleanup_interval;
        loop {
            tokio::time::sleep(interval).await;
            self.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_connections_never_go_negative() {
        let stats = StatsCollector::new(StatsConfig::default());
        stats.record_connection("a", 1);
        stats.record_connection("a", -5);
        assert_eq!(stats.active_connections("a"), 0);
    }

    #[test]
    fn min_max_latency_converge_under_interleaved_updates() {
        let stats = StatsCollector::new(StatsConfig::default());
        stats.record_request("a", true, Duration::from_millis(50), 10);
        stats.record_request("a", true, Duration::from_millis(10), 10);
        stats.record_request("a", true, Duration::from_millis(100), 10);
        let data = stats.endpoint_stats("a").unwrap();
        assert_eq!(data.min_latency_ms.load(Ordering::Relaxed), 10);
        assert_eq!(data.max_latency_ms.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn total_equals_successful_plus_failed() {
        let stats = StatsCollector::new(StatsConfig::default());
        stats.record_request("a", true, Duration::from_millis(1), 0);
        stats.record_request("a", false, Duration::from_millis(1), 0);
        let data = stats.endpoint_stats("a").unwrap();
        assert_eq!(
            data.total_requests.load(Ordering::Relaxed),
            data.successful_requests.load(Ordering::Relaxed)
                + data.failed_requests.load(Ordering::Relaxed)
        );
    }

    #[test]
    fn cleanup_evicts_expired_entries() {
        let mut config = StatsConfig::default();
        config.endpoint_ttl = Duration::from_millis(1);
        let stats = StatsCollector::new(config);
        stats.record_request("a", true, Duration::from_millis(1), 0);
        std::thread::sleep(Duration::from_millis(5));
        stats.cleanup();
        assert!(stats.endpoint_stats("a").is_none());
    }

    #[test]
    fn cleanup_caps_tracked_endpoints_oldest_first() {
        let mut config = StatsConfig::default();
        config.max_tracked_endpoints = 1;
        config.endpoint_ttl = Duration::from_secs(3600);
        let stats = StatsCollector::new(config);
        stats.record_request("old", true, Duration::from_millis(1), 0);
        std::thread::sleep(Duration::from_millis(5));
        stats.record_request("new", true, Duration::from_millis(1), 0);
        stats.cleanup();
        assert!(stats.endpoint_stats("old").is_none());
        assert!(stats.endpoint_stats("new").is_some());
    }
}
