//! # HTTP Middleware
//!
//! Access logging for every request that reaches the router. CORS and
//! response timeouts are plain `tower`/`tower-http` layers applied directly
//! in `server.rs` and need no wrapper here. Grounded on the teacher's
//! `middleware/mod.rs::logging_middleware`, trimmed of the auth, metrics,
//! plugin and input-validation middleware the teacher's multi-tenant gateway
//! carried — Olla has no auth layer, no plugin system, and no per-request
//! billing metrics to attribute.

use crate::server::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

/// Logs method, URI, status and latency for every request. Runs before
/// `TimeoutLayer`, so a request that times out is still logged with
/// whatever status the timeout response carries.
pub async fn access_log_middleware(
    State(_state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = next.run(req).await;

    let latency = start.elapsed();
    let status = response.status();
    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        latency_ms = latency.as_millis(),
        "request handled"
    );

    response
}
