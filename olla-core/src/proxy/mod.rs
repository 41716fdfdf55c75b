//! # Proxy Engine
//!
//! The `ProxyEngine` contract both variants implement, plus the shared
//! hop-by-hop header stripping, observability header injection, and
//! timed/sized streaming helper used by both so their forwarding discipline
//! cannot drift apart. Grounded on the teacher's `handlers/mod.rs::
//! chat_completions`/`handle_streaming_chat_completions` for the
//! "dispatch, measure latency, record metrics, map errors" shape and
//! `client.rs::stream_chat_completion`'s `bytes_stream()` forwarding.

pub mod fast;
pub mod simple;

use crate::endpoint::Endpoint;
use crate::error::CoreError;
use crate::stats::StatsCollector;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use std::time::Duration;

/// RAII guard pairing a `+1` active-connection count (recorded by the caller
/// at dial time) with exactly one `-1` on drop, regardless of how the
/// streamed response ends: fully consumed, erroring mid-stream, or dropped
/// early because the client disconnected. Without this, a stream dropped
/// before reaching its own completion/error arm would never decrement,
/// leaking the count for that request.
pub struct ConnectionGuard {
    stats: StatsCollector,
    endpoint_url: String,
}

impl ConnectionGuard {
    pub fn new(stats: StatsCollector, endpoint_url: String) -> Self {
        Self { stats, endpoint_url }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.stats.record_connection(&self.endpoint_url, -1);
    }
}

/// Headers that must never be forwarded between proxy hops (RFC 7230 §6.1
/// plus the handful of vendor additions the spec calls out).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if !HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            out.insert(name.clone(), value.clone());
        }
    }
    out
}

/// Set the `X-Olla-*`/`X-Served-By` observability headers on a response
/// about to be written downstream. Only called for proxied responses —
/// admin/status endpoints never carry these (spec.md §9, Open Question 3).
pub fn inject_observability_headers(
    headers: &mut HeaderMap,
    endpoint: &Endpoint,
    model: Option<&str>,
    request_id: &str,
    response_time: Duration,
) {
    headers.insert(
        HeaderName::from_static("x-olla-endpoint"),
        HeaderValue::from_str(&endpoint.name).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    headers.insert(
        HeaderName::from_static("x-olla-backend-type"),
        HeaderValue::from_static(endpoint.provider.as_str()),
    );
    if let Some(model) = model {
        if let Ok(value) = HeaderValue::from_str(model) {
            headers.insert(HeaderName::from_static("x-olla-model"), value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(HeaderName::from_static("x-olla-request-id"), value);
    }
    headers.insert(
        HeaderName::from_static("x-olla-response-time"),
        HeaderValue::from_str(&format!("{}ms", response_time.as_millis()))
            .unwrap_or_else(|_| HeaderValue::from_static("0ms")),
    );
    headers.insert(
        HeaderName::from_static("x-served-by"),
        HeaderValue::from_str(&format!("olla/{}", endpoint.name))
            .unwrap_or_else(|_| HeaderValue::from_static("olla")),
    );
}

/// A request ready to be forwarded: method, path-and-query after the
/// provider prefix (forwarded verbatim), headers already stripped of
/// hop-by-hop fields, and the body.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Model name extracted from the request body, when present.
    pub model: Option<String>,
    pub request_id: String,
}

/// The result of a successful (possibly non-2xx, passed-through-verbatim)
/// dispatch, ready for the binary crate to wrap into an HTTP response.
pub struct ProxyOutcome {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BoxStream<'static, Result<Bytes, CoreError>>,
    pub endpoint_name: String,
}

impl std::fmt::Debug for ProxyOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyOutcome")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("endpoint_name", &self.endpoint_name)
            .finish_non_exhaustive()
    }
}

/// Both proxy engine variants implement this; `olla::handlers` calls
/// whichever one the config selects.
#[async_trait]
pub trait ProxyEngine: Send + Sync {
    async fn proxy(
        &self,
        request: ProxyRequest,
        candidates: &[Endpoint],
    ) -> Result<ProxyOutcome, CoreError>;
}

/// Re-chunk an upstream byte stream so the downstream writer is flushed at
/// least every `flush_interval` of wall time or whenever `buffer_size`
/// bytes have accumulated, whichever comes first — spec.md §4.5 step 7's
/// bounded-buffering discipline, shared by both engine variants (8 KiB /
/// 100 ms for the simple engine, 64 KiB / adaptive for the high-performance
/// one).
pub fn chunked_forward(
    mut upstream: impl Stream<Item = reqwest::Result<Bytes>> + Unpin + Send + 'static,
    buffer_size: usize,
    flush_interval: Duration,
) -> BoxStream<'static, Result<Bytes, CoreError>> {
    let stream = async_stream::stream! {
        let mut buf = BytesMut::with_capacity(buffer_size);
        loop {
            let sleep = tokio::time::sleep(flush_interval);
            tokio::pin!(sleep);
            tokio::select! {
                chunk = upstream.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            buf.extend_from_slice(&bytes);
                            if buf.len() >= buffer_size {
                                yield Ok(buf.split_to(buf.len()).freeze());
                            }
                        }
                        Some(Err(e)) => {
                            if !buf.is_empty() {
                                yield Ok(buf.split_to(buf.len()).freeze());
                            }
                            yield Err(CoreError::BodyStreamError(e.to_string()));
                            return;
                        }
                        None => {
                            if !buf.is_empty() {
                                yield Ok(buf.split_to(buf.len()).freeze());
                            }
                            return;
                        }
                    }
                }
                _ = &mut sleep => {
                    if !buf.is_empty() {
                        yield Ok(buf.split_to(buf.len()).freeze());
                    }
                }
            }
        }
    };
    Box::pin(stream)
}

/// `true` for transport-level failures that occurred before any upstream
/// byte was read — these are the only failures eligible for retry onto the
/// next candidate (spec.md §4.5 step 5: never retry once a response byte
/// has been observed).
pub fn is_connect_time_failure(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

/// Shared retry loop: select from the (shrinking) candidate set, dial via
/// `dial`, and on a connect-time failure drop that endpoint and try the
/// next one, up to `max_retries` additional attempts. Never retries across
/// a fresh selector call over a different candidate set (spec.md §9, Open
/// Question 2) — `remaining` only ever shrinks.
pub async fn dispatch_with_retries<F, Fut>(
    selector: &dyn crate::selector::Selector,
    stats: &crate::stats::StatsCollector,
    candidates: &[Endpoint],
    max_retries: u32,
    mut dial: F,
) -> Result<(Endpoint, reqwest::Response), CoreError>
where
    F: FnMut(Endpoint) -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut remaining: Vec<Endpoint> = candidates.to_vec();
    let mut attempts = 0u32;

    loop {
        if remaining.is_empty() {
            return Err(if attempts == 0 {
                CoreError::NoRoutableEndpoints
            } else {
                CoreError::AllRetriesFailed
            });
        }
        let endpoint = selector.select(&remaining)?;
        stats.record_connection(&endpoint.url, 1);
        attempts += 1;

        match dial(endpoint.clone()).await {
            Ok(resp) => return Ok((endpoint, resp)),
            Err(e) if is_connect_time_failure(&e) => {
                stats.record_connection(&endpoint.url, -1);
                stats.record_request(&endpoint.url, false, Duration::ZERO, 0);
                remaining.retain(|c| c.url != endpoint.url);
                if attempts > max_retries {
                    return Err(CoreError::AllRetriesFailed);
                }
            }
            Err(e) => {
                stats.record_connection(&endpoint.url, -1);
                return Err(CoreError::Transport(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_all_hop_by_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("Connection", HeaderValue::from_static("keep-alive"));
        headers.insert("Transfer-Encoding", HeaderValue::from_static("chunked"));
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let stripped = strip_hop_by_hop(&headers);
        assert!(!stripped.contains_key("connection"));
        assert!(!stripped.contains_key("transfer-encoding"));
        assert!(stripped.contains_key("content-type"));
    }

    #[tokio::test]
    async fn chunked_forward_flushes_on_size_threshold() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(&[0u8; 10])),
            Ok(Bytes::from_static(&[0u8; 10])),
        ];
        let upstream = futures::stream::iter(chunks);
        let mut out = chunked_forward(upstream, 15, Duration::from_secs(10));
        let first = out.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 20);
    }

    #[tokio::test]
    async fn chunked_forward_flushes_remainder_on_upstream_end() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![Ok(Bytes::from_static(&[1u8; 5]))];
        let upstream = futures::stream::iter(chunks);
        let mut out = chunked_forward(upstream, 1024, Duration::from_secs(10));
        let first = out.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 5);
        assert!(out.next().await.is_none());
    }
}
