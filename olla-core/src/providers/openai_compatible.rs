//! Generic OpenAI-compatible backend profile: `GET /v1/models` discovery,
//! `{"data": [{"id", ...}]}` envelope, no digest — unification for this
//! profile falls back entirely to normalised-name matching.

use crate::error::CoreError;
use crate::models::ModelInfo;
use crate::profile::BackendProfile;
use serde::Deserialize;

pub struct OpenAiCompatibleProfile;

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
struct OpenAiModel {
    id: String,
}

impl BackendProfile for OpenAiCompatibleProfile {
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
        Ok(parsed.data.into_iter().map(|m| ModelInfo::new(m.id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_envelope() {
        let body = br#"{"data":[{"id":"gpt-3.5-turbo","object":"model"}]}"#;
        let models = OpenAiCompatibleProfile.parse_models(body).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "gpt-3.5-turbo");
        assert!(models[0].digest.is_none());
    }
}
