//! # Health Prober
//!
//! One cooperative task per endpoint, issuing `GET`/`HEAD` against the
//! endpoint's health path at `checkInterval` (backed off while unhealthy)
//! and applying the state-transition table from spec.md §4.2. The pure
//! transition function is kept separate from the task loop so it can be
//! exhaustively unit tested without spinning up a runtime or a mock server.

use crate::endpoint::{Endpoint, EndpointStatus};
use crate::profile::profile_for;
use crate::providers::http_client;
use crate::registry::EndpointRegistry;
use crate::stats::StatsCollector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthProberConfig {
    #[serde(with = "crate::common::duration_serde")]
    pub check_interval: Duration,
    #[serde(with = "crate::common::duration_serde")]
    pub check_timeout: Duration,
    /// Consecutive failures before an `Unhealthy` endpoint opens its
    /// circuit and becomes `Offline`.
    pub open_threshold: u32,
    pub max_backoff_multiplier: u32,
    /// How long a recovered endpoint stays `Warming` before becoming fully
    /// `Healthy` in the eyes of the selector (it is already `is_routable()`
    /// while `Warming`; this only affects `trafficWeight`).
    #[serde(with = "crate::common::duration_serde")]
    pub warming_duration: Duration,
}

impl HealthProberConfig {
    fn warming_duration_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.warming_duration).unwrap_or_else(|_| chrono::Duration::zero())
    }
}

impl Default for HealthProberConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(10),
            check_timeout: Duration::from_secs(2),
            open_threshold: 5,
            max_backoff_multiplier: 8,
            warming_duration: Duration::from_secs(30),
        }
    }
}

/// Apply one probe outcome to `endpoint`'s health fields in place,
/// following spec.md §4.2's transition table. Returns `true` if this probe
/// just transitioned the endpoint from `Offline`/`Warming` into a routable
/// state (used by the discovery loop to trigger an on-demand refresh).
pub fn apply_probe_result(
    endpoint: &mut Endpoint,
    probe_ok: bool,
    latency: Option<Duration>,
    config: &HealthProberConfig,
    now: DateTime<Utc>,
) -> bool {
    let was_offline_or_warming =
        matches!(endpoint.status, EndpointStatus::Offline | EndpointStatus::Warming);

    endpoint.last_checked = Some(now);
    endpoint.last_latency_ms = latency.map(|d| d.as_millis() as u64);

    if probe_ok {
        endpoint.consecutive_failures = 0;
        endpoint.backoff_multiplier = 1;
        endpoint.status = if endpoint.status == EndpointStatus::Offline {
            endpoint.warming_since = Some(now);
            EndpointStatus::Warming
        } else if endpoint.status == EndpointStatus::Warming {
            let warm_enough = endpoint
                .warming_since
                .map(|since| now.signed_duration_since(since) >= config.warming_duration_chrono())
                .unwrap_or(true);
            if warm_enough {
                endpoint.warming_since = None;
                EndpointStatus::Healthy
            } else {
                EndpointStatus::Warming
            }
        } else {
            EndpointStatus::Healthy
        };
    } else {
        endpoint.consecutive_failures += 1;
        endpoint.backoff_multiplier =
            (endpoint.backoff_multiplier * 2).min(config.max_backoff_multiplier);

        endpoint.status = match endpoint.status {
            EndpointStatus::Offline => EndpointStatus::Offline,
            _ if endpoint.consecutive_failures >= config.open_threshold => {
                EndpointStatus::Offline
            }
            _ => EndpointStatus::Unhealthy,
        };
    }

    endpoint.next_check_time = Some(
        now + chrono::Duration::from_std(
            endpoint.backoff_interval(config.check_interval, config.max_backoff_multiplier),
        )
        .unwrap_or_default(),
    );

    was_offline_or_warming && endpoint.status.is_routable() && probe_ok
}

/// Run the probe loop for a single endpoint until the registry no longer
/// contains it. Spawned once per configured endpoint by the binary's
/// startup sequence.
pub async fn run_prober(
    registry: EndpointRegistry,
    stats: StatsCollector,
    endpoint_url: String,
    client: reqwest::Client,
    config: HealthProberConfig,
) {
    loop {
        let Some(mut endpoint) = registry.get_by_url(&endpoint_url).await else {
            return;
        };

        if let Some(next) = endpoint.next_check_time {
            let wait = (next - Utc::now())
                .to_std()
                .unwrap_or(Duration::from_secs(0));
            if wait > Duration::ZERO {
                tokio::time::sleep(wait).await;
            }
        }

        let profile = profile_for(endpoint.provider);
        let started = std::time::Instant::now();
        let result = http_client::get(
            &client,
            &endpoint.url,
            profile.health_check_path(),
            config.check_timeout,
        )
        .await;
        let latency = started.elapsed();

        let probe_ok = matches!(&result, Ok(r) if r.status().is_success());
        if !probe_ok {
            stats.record_security_violation("health_probe_failure");
        }

        apply_probe_result(&mut endpoint, probe_ok, Some(latency), &config, Utc::now());
        registry.update_endpoint(endpoint).await;
    }
}
