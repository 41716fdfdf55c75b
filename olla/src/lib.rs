//! # Olla
//!
//! A reverse proxy specialised for routing inference requests across
//! Ollama, LM Studio, vLLM, and OpenAI-compatible backends. This crate is
//! the HTTP surface: it loads configuration, assembles `olla-core`'s
//! registry/unifier/proxy-engine into an `axum::Router`, and maps
//! `olla-core` errors onto HTTP responses.
//!
//! ## Layout
//!
//! - [`config`] — TOML configuration loading, env overrides, validation
//! - [`server`] — `AppState` and router/background-task assembly
//! - [`handlers`] — the proxy passthrough, model listing, and `/internal/*` routes
//! - [`middleware`] — access logging
//! - [`gateway_error`] — `olla-core` errors mapped onto HTTP responses
//! - [`error_handling`] — shared error-context/retry helpers used at startup
//! - [`request_context`] — per-request identity and timing

pub mod config;
pub mod error_handling;
pub mod gateway_error;
pub mod handlers;
pub mod middleware;
pub mod request_context;
pub mod server;

pub use server::create_server;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::http::StatusCode;
    use axum_test::TestServer;

    fn empty_config() -> Config {
        let mut config = Config::default();
        config.server.port = 0;
        config
    }

    #[tokio::test]
    async fn health_check_never_touches_the_registry() {
        let app = create_server(empty_config()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/internal/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.json::<serde_json::Value>();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn status_reports_zero_endpoints_for_an_empty_config() {
        let app = create_server(empty_config()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/internal/status").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let body = response.json::<serde_json::Value>();
        assert_eq!(body["endpoints_total"], 0);
    }

    #[tokio::test]
    async fn proxying_with_no_configured_endpoints_is_service_unavailable() {
        let app = create_server(empty_config()).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.post("/olla/ollama/api/generate").json(&serde_json::json!({})).await;
        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
