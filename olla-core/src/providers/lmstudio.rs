//! LM Studio backend profile: `GET /v1/models` (OpenAI-compatible listing)
//! augmented by the `loaded` and `quantization` fields LM Studio adds to
//! each entry when present.

use crate::error::CoreError;
use crate::models::{ModelDetails, ModelInfo};
use crate::profile::BackendProfile;
use serde::Deserialize;

pub struct LmStudioProfile;

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<LmStudioModel>,
}

#[derive(Debug, Deserialize)]
struct LmStudioModel {
    id: String,
    #[serde(default)]
    loaded: Option<bool>,
    #[serde(default)]
    quantization: Option<String>,
}

impl BackendProfile for LmStudioProfile {
    fn model_discovery_path(&self) -> &'static str {
        "/v1/models"
    }

    fn health_check_path(&self) -> &'static str {
        "/v1/models"
    }

    fn openai_compatible(&self) -> bool {
        true
    }

    fn parse_models(&self, body: &[u8]) -> Result<Vec<ModelInfo>, CoreError> {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }
        let parsed: ModelsResponse =
            serde_json::from_slice(body).map_err(|e| CoreError::DiscoveryParse {
                endpoint: String::new(),
                reason: e.to_string(),
            })?;

        Ok(parsed
            .data
            .into_iter()
            .map(|m| {
                let mut info = ModelInfo::new(m.id);
                let mut details = ModelDetails::new();
                if let Some(loaded) = m.loaded {
                    details.insert("loaded".into(), serde_json::Value::Bool(loaded));
                }
                if let Some(q) = m.quantization {
                    details.insert("quantization".into(), serde_json::Value::String(q));
                }
                info.details = details;
                info
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_loaded_and_quantization() {
        let body = br#"{"data":[{"id":"llama-3-8b","loaded":true,"quantization":"Q4_K_M"}]}"#;
        let models = LmStudioProfile.parse_models(body).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(
            models[0].details.get("loaded").and_then(|v| v.as_bool()),
            Some(true)
        );
    }
}
