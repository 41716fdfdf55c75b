//! # Backend Profiles
//!
//! Resolves an endpoint's `ProviderKind` to the paths and parser it needs
//! for discovery and health probing, mirroring the teacher's
//! `create_provider` dispatch table (`match config.name.as_str() { ... }`)
//! but resolving to a profile descriptor instead of an outbound client —
//! Olla never originates chat-completion requests, it only needs to know
//! where to look for a model list and how to read it.

use crate::endpoint::ProviderKind;
use crate::error::CoreError;
use crate::models::ModelInfo;
use crate::providers;

/// Provider-specific configuration the core treats as opaque beyond the
/// three operations below.
pub trait BackendProfile: Send + Sync {
    /// Path (relative to the endpoint's base URL) to fetch for model
    /// discovery.
    fn model_discovery_path(&self) -> &'static str;

    /// Path to probe for liveness/health.
    fn health_check_path(&self) -> &'static str;

    /// `true` if this profile's native model-listing format is the
    /// OpenAI-compatible `{"data": [...]}` envelope.
    fn openai_compatible(&self) -> bool;

    /// Parse a discovery response body into zero or more `ModelInfo`
    /// records. An empty body parses to an empty vector, never an error.
    /// Malformed individual elements inside an otherwise valid envelope are
    /// skipped (and logged by the caller), not propagated as an error.
    fn parse_models(&self, body: &[u8]) -> Result<Vec<ModelInfo>, CoreError>;
}

/// Resolve the `BackendProfile` for a `ProviderKind`.
pub fn profile_for(kind: ProviderKind) -> &'static dyn BackendProfile {
    match kind {
        ProviderKind::Ollama => &providers::ollama::OllamaProfile,
        ProviderKind::LmStudio => &providers::lmstudio::LmStudioProfile,
        ProviderKind::Vllm => &providers::vllm::VllmProfile,
        ProviderKind::OpenAiCompatible => &providers::openai_compatible::OpenAiCompatibleProfile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_provider_kind_resolves_to_a_profile() {
        for kind in [
            ProviderKind::Ollama,
            ProviderKind::LmStudio,
            ProviderKind::Vllm,
            ProviderKind::OpenAiCompatible,
        ] {
            let profile = profile_for(kind);
            assert!(!profile.model_discovery_path().is_empty());
            assert!(!profile.health_check_path().is_empty());
        }
    }

    #[test]
    fn empty_body_parses_to_empty_vec_never_errors() {
        for kind in [
            ProviderKind::Ollama,
            ProviderKind::LmStudio,
            ProviderKind::Vllm,
            ProviderKind::OpenAiCompatible,
        ] {
            let profile = profile_for(kind);
            let models = profile.parse_models(b"").unwrap();
            assert!(models.is_empty());
        }
    }
}
