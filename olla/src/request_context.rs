//! # Request Context
//!
//! Per-request identity and timing, threaded through the proxy handler for
//! logging and the `X-Olla-Request-ID` response header. Grounded on the
//! teacher's `request_context.rs::RequestContext`, trimmed of the
//! `user_id`/`api_key` fields it carried for its authenticated multi-tenant
//! gateway — Olla has no auth layer to populate them.

use std::time::Instant;
use uuid::Uuid;

/// Tracks one request's identity and start time across the handler and
/// proxy engine.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub start_time: Instant,
    pub metadata: std::collections::HashMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            start_time: Instant::now(),
            metadata: std::collections::HashMap::new(),
        }
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn with_metadata(mut self, key: String, value: String) -> Self {
        self.metadata.insert(key, value);
        self
    }

    pub fn get_metadata(&self, key: &str) -> Option<&String> {
        self.metadata.get(key)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_context_gets_a_distinct_request_id() {
        let a = RequestContext::new();
        let b = RequestContext::new();
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn metadata_round_trips() {
        let ctx = RequestContext::new().with_metadata("provider".to_string(), "ollama".to_string());
        assert_eq!(ctx.get_metadata("provider"), Some(&"ollama".to_string()));
        assert_eq!(ctx.get_metadata("missing"), None);
    }
}
