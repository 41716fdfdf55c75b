//! Shared GET helper for discovery and health probing.
//!
//! Grounded on the teacher's `HttpProviderClient` (`providers/
//! http_client.rs`) — same "build once, reuse `reqwest::Client`" shape —
//! trimmed to the one verb Olla ever issues against a backend: `GET`. Olla
//! never authenticates to or mutates a backend, so the auth-strategy and
//! POST/multipart methods the teacher needed for outbound chat-completion
//! calls have no counterpart here.

use std::time::Duration;

/// Issue `GET {base_url}{path}` and return the raw response body.
///
/// A non-2xx status is not treated as a discovery/health failure by this
/// helper — callers (the prober cares only about "did we get a response",
/// the discovery loop wants the body regardless of status to decide how to
/// log it) inspect `reqwest::Response::status()` themselves via
/// `get_with_status`.
pub async fn get_bytes(
    client: &reqwest::Client,
    base_url: &str,
    path: &str,
    timeout: Duration,
) -> Result<bytes::Bytes, reqwest::Error> {
    let url = build_url(base_url, path);
    client.get(url).timeout(timeout).send().await?.bytes().await
}

/// Issue `GET {base_url}{path}` and return the response so the caller can
/// inspect status before deciding whether to read the body.
pub async fn get(
    client: &reqwest::Client,
    base_url: &str,
    path: &str,
    timeout: Duration,
) -> Result<reqwest::Response, reqwest::Error> {
    let url = build_url(base_url, path);
    client.get(url).timeout(timeout).send().await
}

fn build_url(base_url: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{}{}", base_url.trim_end_matches('/'), path)
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_joins_without_double_slash() {
        assert_eq!(build_url("http://h:1/", "/v1/models"), "http://h:1/v1/models");
        assert_eq!(build_url("http://h:1", "/v1/models"), "http://h:1/v1/models");
        assert_eq!(build_url("http://h:1", "v1/models"), "http://h:1/v1/models");
    }
}
