//! # Model Unifier
//!
//! Aggregates per-endpoint `ModelInfo` batches into the per-provider-type
//! `UnifiedModel` catalogue. Grounded on the teacher's `cache.rs`
//! (`DashMap`-backed concurrent store) for the concurrency shape and
//! `routing.rs::Router`'s "filter then select" method layout for the public
//! read contract.
//!
//! Unification scope is per-provider-type: a `ModelRegistry` never merges
//! models reported by endpoints of different `ProviderKind`s, even if their
//! names coincide.

use crate::endpoint::{Endpoint, ProviderKind};
use crate::models::{ModelInfo, ModelState, UnifiedModel};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;

/// Normalise a backend-native name for cross-alias matching: lowercase,
/// strip common file-extension suffixes, trim whitespace.
fn normalise_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let stripped = lower
        .strip_suffix(".gguf")
        .or_else(|| lower.strip_suffix(".bin"))
        .or_else(|| lower.strip_suffix(".safetensors"))
        .unwrap_or(&lower);
    stripped.trim().to_string()
}

struct CatalogueEntry {
    model: UnifiedModel,
    last_touched: DateTime<Utc>,
}

/// Per-provider-type catalogue. Many readers, one writer (the discovery
/// loop) — writers are naturally serialised by `&mut self` on
/// `ingest`/`detach_endpoint`; readers use `DashMap`'s internal sharding so
/// they never block each other.
pub struct ModelRegistry {
    catalogues: DashMap<ProviderKind, HashMap<String, CatalogueEntry>>,
    staleness_window: Duration,
}

impl ModelRegistry {
    pub fn new(staleness_window: Duration) -> Self {
        Self {
            catalogues: DashMap::new(),
            staleness_window,
        }
    }

    /// Ingest one endpoint's freshly discovered model batch, merging into
    /// the catalogue for `endpoint.provider`. Endpoints previously reported
    /// by this endpoint but absent from `batch` are detached (their entry
    /// in `endpoints` is removed, not the whole `UnifiedModel`).
    pub fn ingest(&self, endpoint: &Endpoint, batch: Vec<ModelInfo>, now: DateTime<Utc>) {
        let mut catalogue = self
            .catalogues
            .entry(endpoint.provider)
            .or_insert_with(HashMap::new);

        let reported: Vec<String> = batch.iter().map(|m| m.name.clone()).collect();

        for info in batch {
            self.merge_one(&mut catalogue, endpoint, info, now);
        }

        for entry in catalogue.values_mut() {
            let still_reports = entry
                .model
                .aliases
                .iter()
                .any(|alias| reported.iter().any(|r| r == alias));
            if !still_reports {
                entry.model.remove_endpoint(&endpoint.url);
            }
        }
    }

    fn merge_one(
        &self,
        catalogue: &mut HashMap<String, CatalogueEntry>,
        endpoint: &Endpoint,
        info: ModelInfo,
        now: DateTime<Utc>,
    ) {
        let normalised = normalise_name(&info.name);

        // Digest match wins over name match.
        if let Some(digest) = &info.digest {
            if let Some((_, entry)) = catalogue
                .iter_mut()
                .find(|(_, e)| e.model.digests.contains(digest))
            {
                entry.model.aliases.insert(info.name.clone());
                entry.model.upsert_endpoint(&endpoint.url, ModelState::Loaded);
                entry.last_touched = now;
                return;
            }
        }

        if let Some(entry) = catalogue.get_mut(&normalised) {
            let digest_conflict = match (&info.digest, entry.model.digests.iter().next()) {
                (Some(new), Some(existing)) => new != existing,
                _ => false,
            };
            if !digest_conflict {
                entry.model.aliases.insert(info.name.clone());
                if let Some(d) = &info.digest {
                    entry.model.digests.insert(d.clone());
                }
                entry.model.upsert_endpoint(&endpoint.url, ModelState::Loaded);
                entry.last_touched = now;
                return;
            }
        }

        let mut model = UnifiedModel::new(normalised.clone());
        model.aliases.insert(info.name.clone());
        if let Some(d) = info.digest {
            model.digests.insert(d);
        }
        if let Some(family) = info.details.get("family").and_then(|v| v.as_str()) {
            model.family = Some(family.to_string());
        }
        if let Some(ps) = info.details.get("parameter_size").and_then(|v| v.as_str()) {
            model.parameter_size = Some(ps.to_string());
        }
        if let Some(q) = info.details.get("quantization").and_then(|v| v.as_str()) {
            model.quantisation = Some(q.to_string());
        }
        model.upsert_endpoint(&endpoint.url, ModelState::Loaded);
        catalogue.insert(normalised.clone(), CatalogueEntry {
            model,
            last_touched: now,
        });
    }

    /// Drop catalogue entries with no endpoints that have been untouched
    /// for longer than the configured staleness window.
    pub fn sweep_stale(&self, now: DateTime<Utc>) {
        for mut catalogue in self.catalogues.iter_mut() {
            catalogue.retain(|_, entry| {
                entry.model.is_reachable()
                    || now.signed_duration_since(entry.last_touched)
                        < chrono::Duration::from_std(self.staleness_window).unwrap_or_default()
            });
        }
    }

    /// `true` if at least one endpoint of `provider` has ever reported a
    /// model matching `name_or_alias` (by alias, case-insensitive).
    pub fn is_known(&self, provider: ProviderKind, name_or_alias: &str) -> bool {
        let normalised = normalise_name(name_or_alias);
        self.catalogues
            .get(&provider)
            .map(|c| {
                c.values()
                    .any(|e| e.model.id == normalised || e.model.aliases.contains(name_or_alias))
            })
            .unwrap_or(false)
    }

    /// Endpoint URLs (regardless of current routability) that have
    /// reported `name_or_alias`.
    pub fn endpoints_for_model(&self, provider: ProviderKind, name_or_alias: &str) -> Vec<String> {
        let normalised = normalise_name(name_or_alias);
        self.catalogues
            .get(&provider)
            .map(|c| {
                c.values()
                    .filter(|e| e.model.id == normalised || e.model.aliases.contains(name_or_alias))
                    .flat_map(|e| e.model.endpoints.iter().map(|r| r.endpoint_url.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Intersect `endpoints_for_model` with a caller-supplied routable set.
    pub fn healthy_endpoints_for_model(
        &self,
        provider: ProviderKind,
        name_or_alias: &str,
        routable: &[Endpoint],
    ) -> Vec<Endpoint> {
        let urls = self.endpoints_for_model(provider, name_or_alias);
        routable
            .iter()
            .filter(|e| urls.iter().any(|u| u == &e.url))
            .cloned()
            .collect()
    }

    /// Snapshot of all `UnifiedModel`s across all provider types, for the
    /// `/olla/models` handler.
    pub fn all_models(&self) -> Vec<UnifiedModel> {
        self.catalogues
            .iter()
            .flat_map(|c| c.value().values().map(|e| e.model.clone()).collect::<Vec<_>>())
            .collect()
    }

    pub fn models_for_provider(&self, provider: ProviderKind) -> Vec<UnifiedModel> {
        self.catalogues
            .get(&provider)
            .map(|c| c.values().map(|e| e.model.clone()).collect())
            .unwrap_or_default()
    }
}
