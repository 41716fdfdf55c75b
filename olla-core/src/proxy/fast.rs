//! # High-Performance Proxy Engine (Variant B)
//!
//! Per-endpoint `reqwest::Client` transports (so each backend gets its own
//! connection pool rather than sharing one), a 64 KiB streaming buffer, and
//! a per-endpoint [`CircuitBreaker`] consulted *before* dispatch: an Open
//! endpoint is skipped in favour of the next candidate rather than dialled
//! and left to fail. Grounded on the teacher's `client.rs::ConnectionPool`
//! (generalised from "one pool per provider" to "one pool per endpoint")
//! and `providers/circuit_breaker_provider.rs`'s "guard dispatch with a
//! breaker, map breaker-open to a retryable condition" composition.

use super::{
    chunked_forward, inject_observability_headers, is_connect_time_failure, strip_hop_by_hop,
    ConnectionGuard, ProxyEngine, ProxyOutcome, ProxyRequest,
};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::endpoint::Endpoint;
use crate::error::CoreError;
use crate::selector::Selector;
use crate::stats::StatsCollector;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};

const BUFFER_SIZE: usize = 64 * 1024;
const FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Per-endpoint transport pool. `reqwest::Client` is itself `Arc`-backed
/// internally, so entries are cheap to clone out of the map.
struct TransportPool {
    clients: DashMap<String, reqwest::Client>,
    breakers: DashMap<String, CircuitBreaker>,
    breaker_config: CircuitBreakerConfig,
}

impl TransportPool {
    fn new(breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            clients: DashMap::new(),
            breakers: DashMap::new(),
            breaker_config,
        }
    }

    fn client_for(&self, endpoint: &str) -> reqwest::Client {
        if let Some(c) = self.clients.get(endpoint) {
            return c.clone();
        }
        self.clients
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                reqwest::Client::builder()
                    .pool_max_idle_per_host(32)
                    .build()
                    .unwrap_or_default()
            })
            .clone()
    }

    fn breaker_for(&self, endpoint: &str) -> CircuitBreaker {
        if let Some(b) = self.breakers.get(endpoint) {
            return b.clone();
        }
        self.breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| CircuitBreaker::new(endpoint, self.breaker_config.clone()))
            .clone()
    }
}

pub struct FastProxyEngine {
    pool: Arc<TransportPool>,
    selector: Arc<dyn Selector>,
    stats: StatsCollector,
    max_retries: u32,
}

impl FastProxyEngine {
    pub fn new(
        selector: Arc<dyn Selector>,
        stats: StatsCollector,
        max_retries: u32,
        breaker_config: CircuitBreakerConfig,
    ) -> Self {
        Self {
            pool: Arc::new(TransportPool::new(breaker_config)),
            selector,
            stats,
            max_retries,
        }
    }
}

#[async_trait]
impl ProxyEngine for FastProxyEngine {
    async fn proxy(
        &self,
        request: ProxyRequest,
        candidates: &[Endpoint],
    ) -> Result<ProxyOutcome, CoreError> {
        let started = Instant::now();
        let headers = strip_hop_by_hop(&request.headers);

        let mut remaining: Vec<Endpoint> = candidates.to_vec();
        let mut attempts = 0u32;

        let (endpoint, breaker, response) = loop {
            if remaining.is_empty() {
                return Err(if attempts == 0 {
                    CoreError::NoRoutableEndpoints
                } else {
                    CoreError::AllRetriesFailed
                });
            }
            let endpoint = self.selector.select(&remaining)?;
            let breaker = self.pool.breaker_for(&endpoint.url);

            if !breaker.allow_request().await {
                // Open and not yet eligible for a half-open probe: skip
                // without counting it as a dial attempt against this
                // endpoint's own retry budget, but do remove it from this
                // request's candidate set so we don't spin on it.
                remaining.retain(|c| c.url != endpoint.url);
                continue;
            }

            attempts += 1;
            self.stats.record_connection(&endpoint.url, 1);
            let client = self.pool.client_for(&endpoint.url);
            let url = format!(
                "{}{}",
                endpoint.url.trim_end_matches('/'),
                request.path_and_query
            );

            match client
                .request(request.method.clone(), url)
                .headers(headers.clone())
                .body(request.body.clone())
                .send()
                .await
            {
                Ok(resp) => break (endpoint, breaker, resp),
                Err(e) if is_connect_time_failure(&e) => {
                    self.stats.record_connection(&endpoint.url, -1);
                    self.stats
                        .record_request(&endpoint.url, false, Duration::ZERO, 0);
                    breaker.record_failure().await;
                    remaining.retain(|c| c.url != endpoint.url);
                    if attempts > self.max_retries {
                        return Err(CoreError::AllRetriesFailed);
                    }
                }
                Err(e) => {
                    self.stats.record_connection(&endpoint.url, -1);
                    breaker.record_failure().await;
                    return Err(CoreError::Transport(e));
                }
            }
        };

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
            while let Some(chunk) = forwarded.next().await {
                match &chunk {
                    Ok(bytes) => total_bytes += bytes.len() as u64,
                    Err(_) => {
                        stats.record_request(&endpoint_url, false, start.elapsed(), total_bytes);
                        breaker.record_failure().await;
                        yield chunk;
                        return;
                    }
                }
                yield chunk;
            }
            stats.record_request(&endpoint_url, true, start.elapsed(), total_bytes);
            breaker.record_success().await;
        });

        Ok(ProxyOutcome {
            status,
            headers: out_headers,
            body: timed,
            endpoint_name: endpoint.name,
        })
    }
}
