//! # Endpoint
//!
//! A configured backend and the health/routing state the prober and
//! selectors share. Mutated only by the health prober (`status`,
//! `last_checked`, `last_latency`, `consecutive_failures`,
//! `backoff_multiplier`, `next_check_time`); everything else is fixed at
//! configuration time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health state of an `Endpoint`, mutated only by the health prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    /// Never successfully probed.
    Unknown,
    /// Last probe succeeded; full traffic weight.
    Healthy,
    /// Healthy but flagged as busy by the proxy engine's connection-count
    /// heuristic; reduced traffic weight.
    Busy,
    /// Recently recovered from Offline; traffic is drained back gradually.
    Warming,
    /// One or more recent probes failed; circuit not yet open.
    Unhealthy,
    /// Circuit breaker open; not dialled except at `next_check_time`.
    Offline,
}

impl EndpointStatus {
    /// `true` for statuses that may receive traffic (at full or reduced
    /// weight).
    pub fn is_routable(self) -> bool {
        matches!(self, Self::Healthy | Self::Busy | Self::Warming)
    }

    /// Weighted-random share of traffic a priority-tier selector should give
    /// an endpoint in this state, relative to its peers.
    pub fn traffic_weight(self) -> f64 {
        match self {
            Self::Healthy => 1.0,
            Self::Busy => 0.3,
            Self::Warming => 0.1,
            Self::Unknown | Self::Unhealthy | Self::Offline => 0.0,
        }
    }
}

/// The provider family a backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Ollama,
    LmStudio,
    Vllm,
    OpenAiCompatible,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::LmStudio => "lmstudio",
            Self::Vllm => "vllm",
            Self::OpenAiCompatible => "openai-compatible",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ollama" => Ok(Self::Ollama),
            "lmstudio" | "lm-studio" => Ok(Self::LmStudio),
            "vllm" => Ok(Self::Vllm),
            "openai-compatible" | "openai" => Ok(Self::OpenAiCompatible),
            other => Err(crate::error::CoreError::UnknownProviderKind(
                other.to_string(),
            )),
        }
    }
}

/// A configured backend: identity plus health/routing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Stable identifier, unique within the registry.
    pub name: String,
    /// Base URL, e.g. `http://127.0.0.1:11434`.
    pub url: String,
    /// Provider family this endpoint speaks.
    pub provider: ProviderKind,
    /// Higher priority is preferred by the priority selector.
    pub priority: i32,
    /// Optional cap on concurrent active connections, enforced by the proxy
    /// engine's busy-threshold logic (not a hard admission limit).
    pub max_connections: Option<u32>,

    pub status: EndpointStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub backoff_multiplier: u32,
    pub next_check_time: Option<DateTime<Utc>>,
    /// When this endpoint most recently entered `Warming`. Cleared once it
    /// is promoted to `Healthy`; used to time the `warmingDuration` hold.
    pub warming_since: Option<DateTime<Utc>>,
}

impl Endpoint {
    /// A freshly configured endpoint, `Unknown` until first probed.
    pub fn new(name: impl Into<String>, url: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            provider,
            priority: 0,
            max_connections: None,
            status: EndpointStatus::Unknown,
            last_checked: None,
            last_latency_ms: None,
            consecutive_failures: 0,
            backoff_multiplier: 1,
            next_check_time: None,
            warming_since: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// The `(name, url, provider)` tuple used by `LoadFromConfig` to decide
    /// whether an endpoint's health state should be preserved across reload.
    pub fn identity(&self) -> (&str, &str, ProviderKind) {
        (&self.name, &self.url, self.provider)
    }

    pub fn is_routable(&self) -> bool {
        self.status.is_routable()
    }

    pub fn traffic_weight(&self) -> f64 {
        self.status.traffic_weight()
    }

    /// Compute `next_check_time` from `last_checked`, `base_interval` and
    /// the current `backoff_multiplier`, capped at `max_backoff_multiplier`.
    pub fn backoff_interval(&self, base_interval: Duration, max_multiplier: u32) -> Duration {
        let multiplier = self.backoff_multiplier.min(max_multiplier);
        base_interval.saturating_mul(multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routability_matches_status() {
        assert!(EndpointStatus::Healthy.is_routable());
        assert!(EndpointStatus::Busy.is_routable());
        assert!(EndpointStatus::Warming.is_routable());
        assert!(!EndpointStatus::Unknown.is_routable());
        assert!(!EndpointStatus::Unhealthy.is_routable());
        assert!(!EndpointStatus::Offline.is_routable());
    }

    #[test]
    fn traffic_weights_match_spec_table() {
        assert_eq!(EndpointStatus::Healthy.traffic_weight(), 1.0);
        assert_eq!(EndpointStatus::Busy.traffic_weight(), 0.3);
        assert_eq!(EndpointStatus::Warming.traffic_weight(), 0.1);
        assert_eq!(EndpointStatus::Offline.traffic_weight(), 0.0);
    }

    #[test]
    fn backoff_caps_at_max_multiplier() {
        let mut e = Endpoint::new("a", "http://localhost", ProviderKind::Ollama);
        e.backoff_multiplier = 100;
        assert_eq!(
            e.backoff_interval(Duration::from_secs(1), 8),
            Duration::from_secs(8)
        );
    }

    #[test]
    fn provider_kind_round_trips_through_str() {
        use std::str::FromStr;
        assert_eq!(ProviderKind::from_str("ollama").unwrap(), ProviderKind::Ollama);
        assert_eq!(ProviderKind::from_str("lmstudio").unwrap(), ProviderKind::LmStudio);
        assert_eq!(ProviderKind::from_str("vllm").unwrap(), ProviderKind::Vllm);
        assert_eq!(
            ProviderKind::from_str("openai-compatible").unwrap(),
            ProviderKind::OpenAiCompatible
        );
        assert!(ProviderKind::from_str("bogus").is_err());
    }
}
