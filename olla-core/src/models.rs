//! # Model Inventory Types
//!
//! `ModelInfo` is one backend's raw view of one model, as produced by a
//! backend profile's response parser. `UnifiedModel` is the aggregated,
//! per-provider-type canonical record the unifier maintains and the
//! `/olla/models` handler serialises.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Free-form provider-native metadata a parser could not normalise into a
/// dedicated `ModelInfo` field (context length, quantisation, family, ...).
pub type ModelDetails = HashMap<String, serde_json::Value>;

/// One backend's view of one model. Immutable once produced by a parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Backend-native model name, e.g. `"llama3:8b"`.
    pub name: String,
    /// Content digest, when the backend reports one (Ollama does; generic
    /// OpenAI-compatible listings usually do not).
    pub digest: Option<String>,
    /// Size in bytes, when reported.
    pub size: Option<u64>,
    pub last_seen: DateTime<Utc>,
    pub details: ModelDetails,
}

impl ModelInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            digest: None,
            size: None,
            last_seen: Utc::now(),
            details: ModelDetails::new(),
        }
    }
}

/// Per-endpoint availability of a `UnifiedModel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    /// Currently loaded in the backend's memory and ready to serve.
    Loaded,
    /// Known to the backend but not necessarily resident (e.g. on disk).
    Available,
    /// The endpoint that reported this model is no longer routable.
    Offline,
}

/// One endpoint's relationship to a `UnifiedModel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEndpointRef {
    pub endpoint_url: String,
    pub state: ModelState,
}

/// The aggregated, per-provider-type canonical record for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedModel {
    /// Canonical id, usually the normalised form of the first-seen name.
    pub id: String,
    pub family: Option<String>,
    pub variant: Option<String>,
    pub parameter_size: Option<String>,
    pub quantisation: Option<String>,
    pub format: Option<String>,
    pub max_context_length: Option<u64>,
    /// Backend-native names known to refer to this model.
    pub aliases: BTreeSet<String>,
    /// Digests seen for this model (normally one, but tracked as a set so a
    /// digest conflict can be detected rather than silently overwritten).
    pub digests: BTreeSet<String>,
    pub endpoints: Vec<ModelEndpointRef>,
    pub capabilities: BTreeSet<String>,
}

impl UnifiedModel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            family: None,
            variant: None,
            parameter_size: None,
            quantisation: None,
            format: None,
            max_context_length: None,
            aliases: BTreeSet::new(),
            digests: BTreeSet::new(),
            endpoints: Vec::new(),
            capabilities: BTreeSet::new(),
        }
    }

    /// `Loaded` if any endpoint is Loaded; else `Available` if any endpoint
    /// is Available; else `Offline`.
    pub fn aggregate_state(&self) -> ModelState {
        if self.endpoints.iter().any(|e| e.state == ModelState::Loaded) {
            ModelState::Loaded
        } else if self
            .endpoints
            .iter()
            .any(|e| e.state == ModelState::Available)
        {
            ModelState::Available
        } else {
            ModelState::Offline
        }
    }

    /// Add or update an endpoint's entry; never produces a duplicate.
    pub fn upsert_endpoint(&mut self, url: &str, state: ModelState) {
        if let Some(existing) = self.endpoints.iter_mut().find(|e| e.endpoint_url == url) {
            existing.state = state;
        } else {
            self.endpoints.push(ModelEndpointRef {
                endpoint_url: url.to_string(),
                state,
            });
        }
    }

    pub fn remove_endpoint(&mut self, url: &str) {
        self.endpoints.retain(|e| e.endpoint_url != url);
    }

    pub fn is_reachable(&self) -> bool {
        !self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_endpoint_never_duplicates() {
        let mut m = UnifiedModel::new("llama3:8b");
        m.upsert_endpoint("http://a", ModelState::Loaded);
        m.upsert_endpoint("http://a", ModelState::Available);
        assert_eq!(m.endpoints.len(), 1);
        assert_eq!(m.endpoints[0].state, ModelState::Available);
    }

    #[test]
    fn aggregate_state_prefers_loaded_over_available() {
        let mut m = UnifiedModel::new("llama3:8b");
        m.upsert_endpoint("http://a", ModelState::Available);
        m.upsert_endpoint("http://b", ModelState::Loaded);
        assert_eq!(m.aggregate_state(), ModelState::Loaded);
    }

    #[test]
    fn aggregate_state_offline_when_no_endpoints() {
        let m = UnifiedModel::new("llama3:8b");
        assert_eq!(m.aggregate_state(), ModelState::Offline);
        assert!(!m.is_reachable());
    }
}
