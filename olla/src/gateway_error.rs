//! # Gateway Error Types
//!
//! Maps `olla-core` errors (and a small set of binary-crate-only errors —
//! bad config, malformed request bodies) onto HTTP responses, following
//! spec.md §7's error-handling table. Grounded on the teacher's
//! `gateway_error.rs::GatewayError`/`IntoResponse` shape, with the
//! provider-SDK error variants replaced by `olla_core::error::CoreError`
//! and the auth/rate-limit/content-filter/cache/plugin variants dropped
//! (out of scope for a routing-only proxy).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use olla_core::error::CoreError;
use serde_json::json;
use thiserror::Error;

/// Errors the `olla` binary crate's HTTP layer can return.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Propagated from `olla-core`'s registry, selector, or proxy engine.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The request body could not be parsed as JSON when a model name was
    /// needed to route it.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Configuration failed to load or validate at startup.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Internal error with no more specific classification.
    #[error("internal server error: {message}")]
    Internal { message: String },

    /// JSON serialisation failure building a response body.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type, routing_reason) = match &self {
            GatewayError::Core(CoreError::NoRoutableEndpoints) => {
                (StatusCode::SERVICE_UNAVAILABLE, "no_routable_endpoints", None)
            }
            GatewayError::Core(CoreError::NoEndpointForModel { .. }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no_endpoint_for_model",
                Some("model_not_routable"),
            ),
            GatewayError::Core(CoreError::AllRetriesFailed) => {
                (StatusCode::BAD_GATEWAY, "all_retries_failed", None)
            }
            GatewayError::Core(CoreError::CircuitOpen { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "circuit_open", None)
            }
            GatewayError::Core(CoreError::ClientCancelled) => {
                (StatusCode::BAD_REQUEST, "client_cancelled", None)
            }
            GatewayError::Core(CoreError::BodyStreamError(_)) => {
                (StatusCode::BAD_GATEWAY, "body_stream_error", None)
            }
            GatewayError::Core(CoreError::UnknownProviderKind(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "unknown_provider_kind", None)
            }
            GatewayError::Core(CoreError::InvalidConfig(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "invalid_config", None)
            }
            GatewayError::Core(CoreError::Transport(_)) => {
                (StatusCode::BAD_GATEWAY, "transport_error", None)
            }
            GatewayError::Core(CoreError::Serialization(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error", None)
            }
            GatewayError::Core(CoreError::DiscoveryFetch { .. })
            | GatewayError::Core(CoreError::DiscoveryParse { .. })
            | GatewayError::Core(CoreError::HealthProbe { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            GatewayError::InvalidRequest { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_request", None)
            }
            GatewayError::Config { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error", None)
            }
            GatewayError::Internal { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            GatewayError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error", None)
            }
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16()
            }
        }));

        let mut response = (status, body).into_response();
        if let Some(reason) = routing_reason {
            if let Ok(value) = axum::http::HeaderValue::from_str(reason) {
                response
                    .headers_mut()
                    .insert("x-olla-routing-reason", value);
            }
        }
        response
    }
}
