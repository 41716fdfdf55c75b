//! vLLM backend profile: `GET /v1/models` (OpenAI-compatible listing). vLLM
//! typically serves exactly one model per process, so the unifier expects
//! one entry per endpoint here and merges by name across multiple vLLM
//! endpoints serving the same model id.

use crate::error::CoreError;
use crate::models::ModelInfo;
use crate::profile::BackendProfile;
use serde::Deserialize;

pub struct VllmProfile;

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<VllmModel>,
}

#[derive(Debug, Deserialize)]
struct VllmModel {
    id: String,
    #[serde(default)]
    max_model_len: Option<u64>,
}

impl BackendProfile for VllmProfile {
    fn model_discovery_path(&self) -> &'static str {
        "/v1/models"
    }

    fn health_check_path(&self) -> &'static str {
        "/health"
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
                if let Some(len) = m.max_model_len {
                    info.details
                        .insert("max_model_len".into(), serde_json::Value::from(len));
                }
                info
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_model_per_endpoint_is_the_common_case() {
        let body = br#"{"data":[{"id":"mistralai/Mistral-7B-Instruct-v0.2","max_model_len":32768}]}"#;
        let models = VllmProfile.parse_models(body).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "mistralai/Mistral-7B-Instruct-v0.2");
    }
}
