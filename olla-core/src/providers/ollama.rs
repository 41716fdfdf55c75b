//! Ollama backend profile: `GET /api/tags` discovery, `GET /` health.
//!
//! Grounded on the teacher's `providers/ollama.rs` for the native response
//! shape (`map_model`'s field list), repurposed from "build a chat request"
//! to "parse a model listing".

use crate::error::CoreError;
use crate::models::{ModelDetails, ModelInfo};
use crate::profile::BackendProfile;
use serde::Deserialize;

pub struct OllamaProfile;

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
    #[serde(default)]
    digest: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    details: Option<OllamaModelDetails>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelDetails {
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    parameter_size: Option<String>,
    #[serde(default)]
    quantization_level: Option<String>,
}

impl BackendProfile for OllamaProfile {
    fn model_discovery_path(&self) -> &'static str {
        "/api/tags"
    }

    fn health_check_path(&self) -> &'static str {
        "/"
    }

    fn openai_compatible(&self) -> bool {
        false
    }

    fn parse_models(&self, body: &[u8]) -> Result<Vec<ModelInfo>, CoreError> {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }
        let parsed: TagsResponse =
            serde_json::from_slice(body).map_err(|e| CoreError::DiscoveryParse {
                endpoint: String::new(),
                reason: e.to_string(),
            })?;

        let mut out = Vec::with_capacity(parsed.models.len());
        for m in parsed.models {
            let mut info = ModelInfo::new(m.name);
            info.digest = m.digest;
            info.size = m.size;
            if let Some(details) = m.details {
                let mut map = ModelDetails::new();
                if let Some(family) = details.family {
                    map.insert("family".into(), serde_json::Value::String(family));
                }
                if let Some(p) = details.parameter_size {
                    map.insert("parameter_size".into(), serde_json::Value::String(p));
                }
                if let Some(q) = details.quantization_level {
                    map.insert("quantization".into(), serde_json::Value::String(q));
                }
                info.details = map;
            }
            out.push(info);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tags_response() {
        let body = br#"{"models":[{"name":"llama3:8b","digest":"sha256:abc","size":123,
            "details":{"family":"llama","parameter_size":"8B","quantization_level":"Q4_0"}}]}"#;
        let models = OllamaProfile.parse_models(body).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "llama3:8b");
        assert_eq!(models[0].digest.as_deref(), Some("sha256:abc"));
        assert_eq!(
            models[0].details.get("family").and_then(|v| v.as_str()),
            Some("llama")
        );
    }

    #[test]
    fn empty_body_is_empty_vec() {
        assert!(OllamaProfile.parse_models(b"").unwrap().is_empty());
    }

    #[test]
    fn invalid_json_is_error() {
        assert!(OllamaProfile.parse_models(b"not json").is_err());
    }
}
