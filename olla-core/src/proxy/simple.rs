//! # Simple Proxy Engine (Variant A)
//!
//! A single shared `reqwest::Client` (bounded idle pool managed by
//! `reqwest` itself) and an 8 KiB streaming buffer. The circuit breaker's
//! state is observed for stats/logging but not enforced here — an Open
//! endpoint can still be dialled by this engine; only the high-performance
//! engine guards dispatch with the breaker. Grounded on the teacher's
//! `client.rs::standalone_chat_completion` single-client dispatch path.

use super::{
    chunked_forward, dispatch_with_retries, inject_observability_headers, strip_hop_by_hop,
    ConnectionGuard, ProxyEngine, ProxyOutcome, ProxyRequest,
};
use crate::endpoint::Endpoint;
use crate::error::CoreError;
use crate::selector::Selector;
use crate::stats::StatsCollector;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

const BUFFER_SIZE: usize = 8 * 1024;
const FLUSH_INTERVAL: Duration = Duration::from_millis(100);

pub struct SimpleProxyEngine {
    client: reqwest::Client,
    selector: Arc<dyn Selector>,
    stats: StatsCollector,
    max_retries: u32,
}

impl SimpleProxyEngine {
    pub fn new(
        client: reqwest::Client,
        selector: Arc<dyn Selector>,
        stats: StatsCollector,
        max_retries: u32,
    ) -> Self {
        Self {
            client,
            selector,
            stats,
            max_retries,
        }
    }
}

#[async_trait]
impl ProxyEngine for SimpleProxyEngine {
    async fn proxy(
        &self,
        request: ProxyRequest,
        candidates: &[Endpoint],
    ) -> Result<ProxyOutcome, CoreError> {
        let started = Instant::now();
        let headers = strip_hop_by_hop(&request.headers);
        let method = request.method.clone();
        let path = request.path_and_query.clone();
        let body = request.body.clone();

        let (endpoint, response) = dispatch_with_retries(
            self.selector.as_ref(),
            &self.stats,
            candidates,
            self.max_retries,
            |endpoint| {
                let client = self.client.clone();
                let url = format!("{}{}", endpoint.url.trim_end_matches('/'), path);
                let method = method.clone();
                let headers = headers.clone();
                let body = body.clone();
                async move {
                    client
                        .request(method, url)
                        .headers(headers)
                        .body(body)
                        .send()
                        .await
                }
            },
        )
        .await?;

        let status = response.status();
        let mut out_headers = strip_hop_by_hop(response.headers());
        inject_observability_headers(
            &mut out_headers,
            &endpoint,
            request.model.as_deref(),
            &request.request_id,
            started.elapsed(),
        );

        let stats = self.stats.clone();
        let endpoint_url = endpoint.url.clone();
        let byte_stream = response.bytes_stream();
        let forwarded = chunked_forward(byte_stream, BUFFER_SIZE, FLUSH_INTERVAL);
        let timed = Box::pin(async_stream::stream! {
            // Dropped at end of scope on every exit path, including an early
            // drop of this generator by a disconnecting client, so the
            // connection count always comes back down exactly once.
            let _guard = ConnectionGuard::new(stats.clone(), endpoint_url.clone());
            let mut total_bytes = 0u64;
            let start = Instant::now();
            futures::pin_mut!(forwarded);
            use futures::StreamExt;
            while let Some(chunk) = forwarded.next().await {
                match &chunk {
                    Ok(bytes) => total_bytes += bytes.len() as u64,
                    Err(_) => {
                        stats.record_request(&endpoint_url, false, start.elapsed(), total_bytes);
                        yield chunk;
                        return;
                    }
                }
                yield chunk;
            }
            stats.record_request(&endpoint_url, true, start.elapsed(), total_bytes);
        });

        Ok(ProxyOutcome {
            status,
            headers: out_headers,
            body: timed,
            endpoint_name: endpoint.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Endpoint, EndpointStatus, ProviderKind};
    use crate::selector::PrioritySelector;
    use crate::stats::StatsCollector;

    #[tokio::test]
    async fn connect_refused_on_the_top_candidate_retries_onto_the_next_one() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let engine = SimpleProxyEngine::new(
            reqwest::Client::new(),
            Arc::new(PrioritySelector),
            StatsCollector::new(Default::default()),
            2,
        );

        let mut unreachable = Endpoint::new("unreachable", "http://127.0.0.1:1", ProviderKind::Ollama)
            .with_priority(100);
        unreachable.status = EndpointStatus::Healthy;
        let mut reachable = Endpoint::new("reachable", server.uri(), ProviderKind::Ollama)
            .with_priority(100);
        reachable.status = EndpointStatus::Healthy;

        let request = ProxyRequest {
            method: reqwest::Method::POST,
            path_and_query: "/api/generate".to_string(),
            headers: reqwest::header::HeaderMap::new(),
            body: bytes::Bytes::new(),
            model: None,
            request_id: "r1".to_string(),
        };

        let outcome = engine
            .proxy(request, &[unreachable.clone(), reachable.clone()])
            .await
            .unwrap();
        assert_eq!(outcome.endpoint_name, "reachable");
        assert_eq!(unreachable.consecutive_failures, 0); // retry doesn't mutate the Endpoint the caller passed in
    }

    #[tokio::test]
    async fn all_candidates_unreachable_is_all_retries_failed() {
        let engine = SimpleProxyEngine::new(
            reqwest::Client::new(),
            Arc::new(PrioritySelector),
            StatsCollector::new(Default::default()),
            1,
        );
        let mut a = Endpoint::new("a", "http://127.0.0.1:1", ProviderKind::Ollama);
        a.status = EndpointStatus::Healthy;
        let mut b = Endpoint::new("b", "http://127.0.0.1:2", ProviderKind::Ollama);
        b.status = EndpointStatus::Healthy;

        let request = ProxyRequest {
            method: reqwest::Method::GET,
            path_and_query: "/".to_string(),
            headers: reqwest::header::HeaderMap::new(),
            body: bytes::Bytes::new(),
            model: None,
            request_id: "r1".to_string(),
        };

        let err = engine.proxy(request, &[a, b]).await.unwrap_err();
        assert!(matches!(err, CoreError::AllRetriesFailed));
    }
}
