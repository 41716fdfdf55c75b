//! # Core Error Types
//!
//! Errors produced by the endpoint registry, health prober, discovery and
//! unification layer, selectors, and proxy engines. Each variant says where
//! the failure was detected; the binary crate (`olla::gateway_error`) maps
//! these onto HTTP status codes and response bodies.

use thiserror::Error;

/// Errors raised by `olla-core` components.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No endpoint in the registry is currently routable.
    #[error("no routable endpoints")]
    NoRoutableEndpoints,

    /// The requested model is not known to the unifier, or is known but has
    /// no routable endpoint. Callers distinguish the two cases via
    /// `ModelRegistry::is_known`.
    #[error("no endpoint serves model '{model}'")]
    NoEndpointForModel { model: String },

    /// All retry candidates failed at connect time.
    #[error("all retry candidates failed to connect")]
    AllRetriesFailed,

    /// The selected endpoint's circuit breaker is open.
    #[error("circuit breaker open for endpoint '{endpoint}'")]
    CircuitOpen { endpoint: String },

    /// The client disconnected before the response completed.
    #[error("client cancelled the request")]
    ClientCancelled,

    /// The upstream body stream failed after headers were already sent.
    #[error("body stream error after headers sent: {0}")]
    BodyStreamError(String),

    /// A discovery fetch against an endpoint's model-list URL failed.
    #[error("discovery fetch failed for endpoint '{endpoint}': {source}")]
    DiscoveryFetch {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// A discovery response could not be parsed by the backend profile's
    /// parser. Recorded and skipped for that cycle, never fatal.
    #[error("discovery parse failed for endpoint '{endpoint}': {reason}")]
    DiscoveryParse { endpoint: String, reason: String },

    /// Health probe transport failure (connect refused, timeout, DNS, TLS).
    #[error("health probe failed for endpoint '{endpoint}': {source}")]
    HealthProbe {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// An unknown backend provider kind was referenced by configuration.
    #[error("unknown backend provider kind: '{0}'")]
    UnknownProviderKind(String),

    /// Configuration failed schema validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic transport-level error surfaced by `reqwest`.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON (de)serialisation failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
