//! # HTTP Request Handlers
//!
//! The proxy passthrough (`/olla/<provider>/...`), model listing endpoints,
//! and the `/internal/*` admin surface. Grounded on the teacher's
//! `handlers/mod.rs::chat_completions` for the "extract, dispatch, map
//! errors" handler shape, re-targeted from a fixed OpenAI-compatible route
//! set to a provider-prefixed catch-all passthrough.

use crate::gateway_error::GatewayError;
use crate::request_context::RequestContext;
use crate::server::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use olla_core::endpoint::ProviderKind;
use olla_core::proxy::ProxyRequest;
use serde_json::json;
use std::str::FromStr;
use tracing::info;

/// `GET /internal/health` — liveness only, never touches the registry.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

/// `GET /internal/status` — aggregate counts for dashboards/alerting.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let endpoints = state.registry.get_all().await;
    let healthy = endpoints
        .iter()
        .filter(|e| e.status == olla_core::endpoint::EndpointStatus::Healthy)
        .count();
    let global = state.stats.global_stats();

    Json(json!({
        "status": "ok",
        "uptime_seconds": global.uptime_seconds,
        "endpoints_total": endpoints.len(),
        "endpoints_healthy": healthy,
        "models_total": state.models.all_models().len(),
    }))
}

/// `GET /internal/status/endpoints` — per-endpoint health/traffic snapshot.
pub async fn status_endpoints(State(state): State<AppState>) -> impl IntoResponse {
    let endpoints = state.registry.get_all().await;
    let body: Vec<_> = endpoints
        .iter()
        .map(|e| {
            json!({
                "name": e.name,
                "url": e.url,
                "type": e.provider.as_str(),
                "status": e.status,
                "consecutive_failures": e.consecutive_failures,
                "last_latency_ms": e.last_latency_ms,
                "active_connections": state.stats.active_connections(&e.url),
            })
        })
        .collect();
    Json(body)
}

/// `GET /internal/status/models` — the full unified catalogue.
pub async fn status_models(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.models.all_models())
}

/// `GET /olla/models` — the unified catalogue, wrapped per spec.md §6.
pub async fn list_unified_models(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "models": state.models.all_models() }))
}

/// `GET /olla/<provider>/v1/models` — that provider kind's native listing
/// shape, reconstructed from the unifier's catalogue rather than re-fetched.
pub async fn list_provider_models(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Response, GatewayError> {
    let kind = ProviderKind::from_str(&provider)?;
    let models = state.models.models_for_provider(kind);
    let profile = olla_core::profile::profile_for(kind);

    if profile.openai_compatible() {
        let data: Vec<_> = models
            .iter()
            .map(|m| {
                json!({
                    "id": m.aliases.iter().next().cloned().unwrap_or_else(|| m.id.clone()),
                    "object": "model",
                    "owned_by": "olla",
                })
            })
            .collect();
        Ok(Json(json!({ "object": "list", "data": data })).into_response())
    } else {
        let data: Vec<_> = models
            .iter()
            .map(|m| {
                json!({
                    "name": m.aliases.iter().next().cloned().unwrap_or_else(|| m.id.clone()),
                    "digest": m.digests.iter().next(),
                })
            })
            .collect();
        Ok(Json(json!({ "models": data })).into_response())
    }
}

/// Derives `EndpointStatus::Busy` from live connection count rather than
/// probe outcome: a `Healthy` endpoint whose active connections exceed
/// `busy_threshold` is downgraded to `Busy` for this request's candidate set
/// only. Left as `Healthy`/anything else untouched — the prober owns every
/// other transition.
fn mark_busy(
    mut endpoint: olla_core::endpoint::Endpoint,
    stats: &olla_core::stats::StatsCollector,
    busy_threshold: i64,
) -> olla_core::endpoint::Endpoint {
    if endpoint.status == olla_core::endpoint::EndpointStatus::Healthy
        && stats.active_connections(&endpoint.url) > busy_threshold
    {
        endpoint.status = olla_core::endpoint::EndpointStatus::Busy;
    }
    endpoint
}

/// `ANY /olla/<provider>/*rest` — the actual reverse-proxy passthrough.
/// Extracts a model name from the request body when present, narrows the
/// candidate set to endpoints of this provider kind that serve that model
/// (or all routable endpoints of this kind when no model is named or the
/// body isn't JSON), and hands off to the configured proxy engine.
pub async fn proxy_request(
    State(state): State<AppState>,
    Path((provider, rest)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
    body: axum::body::Bytes,
) -> Result<Response, GatewayError> {
    let context = RequestContext::new();
    let kind = ProviderKind::from_str(&provider)?;

    let model = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("model").and_then(|m| m.as_str()).map(String::from));

    let routable: Vec<_> = state
        .registry
        .get_routable()
        .await
        .into_iter()
        .filter(|e| e.provider == kind)
        .map(|e| mark_busy(e, &state.stats, state.config.proxy.busy_threshold))
        .collect();

    let candidates = if let Some(model) = &model {
        if state.models.is_known(kind, model) {
            state
                .models
                .healthy_endpoints_for_model(kind, model, &routable)
        } else {
            routable
        }
    } else {
        routable
    };

    if candidates.is_empty() {
        return Err(if let Some(model) = model {
            olla_core::error::CoreError::NoEndpointForModel { model }.into()
        } else {
            olla_core::error::CoreError::NoRoutableEndpoints.into()
        });
    }

    let path_and_query = match uri.query() {
        Some(q) => format!("/{rest}?{q}"),
        None => format!("/{rest}"),
    };

    info!(
        request_id = %context.request_id,
        provider = %provider,
        model = ?model,
        "proxying request"
    );

    let request = ProxyRequest {
        method,
        path_and_query,
        headers,
        body,
        model,
        request_id: context.request_id.clone(),
    };

    let outcome = state.proxy_engine.proxy(request, &candidates).await?;

    let stream = outcome
        .body
        .map(|chunk| chunk.map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>));
    let mut response = Response::builder()
        .status(outcome.status)
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| {
            GatewayError::Internal {
                message: "failed to build response".to_string(),
            }
            .into_response()
        });
    *response.headers_mut() = outcome.headers;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use olla_core::endpoint::{Endpoint, EndpointStatus, ProviderKind};
    use olla_core::stats::StatsCollector;

    #[test]
    fn healthy_endpoint_under_threshold_stays_healthy() {
        let stats = StatsCollector::new(Default::default());
        let mut endpoint = Endpoint::new("a", "http://a", ProviderKind::Ollama);
        endpoint.status = EndpointStatus::Healthy;
        stats.record_connection(&endpoint.url, 3);

        let endpoint = mark_busy(endpoint, &stats, 10);
        assert_eq!(endpoint.status, EndpointStatus::Healthy);
    }

    #[test]
    fn healthy_endpoint_over_threshold_becomes_busy() {
        let stats = StatsCollector::new(Default::default());
        let mut endpoint = Endpoint::new("a", "http://a", ProviderKind::Ollama);
        endpoint.status = EndpointStatus::Healthy;
        stats.record_connection(&endpoint.url, 11);

        let endpoint = mark_busy(endpoint, &stats, 10);
        assert_eq!(endpoint.status, EndpointStatus::Busy);
    }

    #[test]
    fn non_healthy_status_is_left_alone_regardless_of_connection_count() {
        let stats = StatsCollector::new(Default::default());
        let mut endpoint = Endpoint::new("a", "http://a", ProviderKind::Ollama);
        endpoint.status = EndpointStatus::Warming;
        stats.record_connection(&endpoint.url, 999);

        let endpoint = mark_busy(endpoint, &stats, 10);
        assert_eq!(endpoint.status, EndpointStatus::Warming);
    }
}
