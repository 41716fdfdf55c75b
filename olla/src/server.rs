//! # Server Assembly
//!
//! Builds the registry from config, spawns the health-probe, discovery and
//! stats-cleanup background loops, constructs the configured proxy engine
//! and selector, and wires the axum router. Grounded on the teacher's
//! `server.rs::create_server` for the "build state, spawn background tasks,
//! build router, layer middleware" shape, re-targeted from a provider-SDK
//! client plus plugin/auth/cache managers to `olla-core`'s registry/unifier/
//! proxy-engine trio.

use crate::config::{Config, ProxyEngineKind, SelectorConfig};
use crate::{handlers, middleware as olla_middleware};
use axum::routing::{any, get};
use axum::Router;
use olla_core::discovery::run_discovery_loop;
use olla_core::endpoint::Endpoint;
use olla_core::health::run_prober;
use olla_core::proxy::fast::FastProxyEngine;
use olla_core::proxy::simple::SimpleProxyEngine;
use olla_core::proxy::ProxyEngine;
use olla_core::registry::EndpointRegistry;
use olla_core::selector::{LeastConnectionsSelector, PrioritySelector, RoundRobinSelector, Selector};
use olla_core::stats::StatsCollector;
use olla_core::unifier::ModelRegistry;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

/// Shared state handed to every handler. Cheap to clone: `EndpointRegistry`
/// and `StatsCollector` are themselves `Arc`-backed; everything else is
/// wrapped explicitly.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: EndpointRegistry,
    pub models: Arc<ModelRegistry>,
    pub proxy_engine: Arc<dyn ProxyEngine>,
    pub stats: StatsCollector,
}

fn build_selector(kind: SelectorConfig, stats: StatsCollector) -> Arc<dyn Selector> {
    match kind {
        SelectorConfig::Priority => Arc::new(PrioritySelector),
        SelectorConfig::RoundRobin => Arc::new(RoundRobinSelector::default()),
        SelectorConfig::LeastConnections => Arc::new(LeastConnectionsSelector::new(stats)),
    }
}

fn build_proxy_engine(config: &Config, selector: Arc<dyn Selector>, stats: StatsCollector) -> Arc<dyn ProxyEngine> {
    match config.proxy.engine {
        ProxyEngineKind::Simple => Arc::new(SimpleProxyEngine::new(
            reqwest::Client::new(),
            selector,
            stats,
            config.proxy.max_retries,
        )),
        ProxyEngineKind::Fast => Arc::new(FastProxyEngine::new(
            selector,
            stats,
            config.proxy.max_retries,
            config.circuit_breaker.clone(),
        )),
    }
}

/// Assemble the full application: state, background loops, routes.
pub async fn create_server(config: Config) -> anyhow::Result<Router> {
    let registry = EndpointRegistry::new();
    let endpoints: Vec<Endpoint> = config
        .endpoints
        .iter()
        .map(|e| {
            let mut endpoint = Endpoint::new(e.name.clone(), e.url.clone(), e.provider_kind()?)
                .with_priority(e.priority);
            endpoint.max_connections = e.max_connections;
            Ok::<Endpoint, anyhow::Error>(endpoint)
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    registry.load_from_config(endpoints).await;

    let stats = StatsCollector::new(config.stats.clone());
    let models = Arc::new(ModelRegistry::new(config.discovery.model_staleness));

    let discovery_client = reqwest::Client::builder()
        .timeout(config.discovery.timeout)
        .build()?;
    let health_client = reqwest::Client::builder()
        .timeout(config.health.check_timeout)
        .build()?;

    for endpoint in registry.get_all().await.iter() {
        tokio::spawn(run_prober(
            registry.clone(),
            stats.clone(),
            endpoint.url.clone(),
            health_client.clone(),
            config.health.clone(),
        ));
    }
    tokio::spawn(run_discovery_loop(
        registry.clone(),
        models.clone(),
        discovery_client,
        config.discovery.clone(),
    ));
    tokio::spawn(stats.clone().run_cleanup_task());

    let selector = build_selector(config.selector, stats.clone());
    let proxy_engine = build_proxy_engine(&config, selector, stats.clone());

    let state = AppState {
        config: Arc::new(config.clone()),
        registry,
        models,
        proxy_engine,
        stats,
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/olla/models", get(handlers::list_unified_models))
        .route("/olla/{provider}/v1/models", get(handlers::list_provider_models))
        .route("/olla/{provider}/{*rest}", any(handlers::proxy_request))
        .route("/internal/health", get(handlers::health_check))
        .route("/internal/status", get(handlers::status))
        .route("/internal/status/endpoints", get(handlers::status_endpoints))
        .route("/internal/status/models", get(handlers::status_models))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            olla_middleware::access_log_middleware,
        ))
        .layer(TimeoutLayer::new(response_timeout(&state.config)))
        .layer(cors)
        .with_state(state);

    Ok(app)
}

fn response_timeout(config: &Config) -> Duration {
    config.server.response_timeout
}
