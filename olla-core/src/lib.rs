//! # olla-core
//!
//! Endpoint registry, health probing, model unification, selectors, stats
//! and streaming proxy engines for Olla — a reverse proxy specialised for
//! routing requests across Ollama, LM Studio, vLLM, and OpenAI-compatible
//! inference backends.
//!
//! This crate has no HTTP-framework dependency: [`proxy::ProxyEngine`]
//! returns a transport-agnostic [`proxy::ProxyOutcome`] built from
//! `reqwest`/`bytes`/`futures` types only. The `olla` binary crate wraps it
//! into an `axum::response::Response`.
//!
//! ## Layout
//!
//! - [`endpoint`] — the `Endpoint` record and its health/traffic-weight rules
//! - [`registry`] — the concurrent, swap-on-write endpoint set
//! - [`circuit_breaker`] — per-endpoint failure isolation
//! - [`health`] — the health-probe state machine and its background loop
//! - [`profile`] — per-backend-type discovery/health paths and model parsing
//! - [`providers`] — the four concrete `BackendProfile` implementations
//! - [`models`] — `ModelInfo`/`UnifiedModel` data types
//! - [`unifier`] — merges per-endpoint model batches into a unified catalogue
//! - [`discovery`] — the background loop driving the unifier
//! - [`selector`] — endpoint-selection strategies
//! - [`stats`] — lock-free per-endpoint and global counters
//! - [`proxy`] — the streaming proxy engine (simple and high-performance variants)

pub mod circuit_breaker;
pub mod common;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod health;
pub mod models;
pub mod profile;
pub mod providers;
pub mod proxy;
pub mod registry;
pub mod selector;
pub mod stats;
pub mod unifier;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use endpoint::{Endpoint, EndpointStatus, ProviderKind};
pub use error::CoreError;
pub use proxy::{ProxyEngine, ProxyOutcome, ProxyRequest};
pub use registry::EndpointRegistry;
pub use stats::{GlobalStats, StatsCollector};
pub use unifier::ModelRegistry;

/// Result type for `olla-core` operations.
pub type Result<T> = std::result::Result<T, CoreError>;
