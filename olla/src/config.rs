//! # Configuration Management
//!
//! Loads the TOML file describing endpoints, selector strategy, circuit
//! breaker/health/discovery tuning, and server settings, applies environment
//! overrides, then validates the result. Grounded on the teacher's
//! `config.rs::Config::load`/`apply_env_overrides`/`validate_schema` shape,
//! re-targeted from "providers with API keys" to "endpoints with provider
//! kinds".

use olla_core::circuit_breaker::CircuitBreakerConfig;
use olla_core::discovery::DiscoveryConfig;
use olla_core::endpoint::ProviderKind;
use olla_core::health::HealthProberConfig;
use olla_core::stats::StatsConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration loaded from `--config` (default `config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub health: HealthProberConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One backend in the config file. `(name, url, provider)` is the identity
/// tuple `EndpointRegistry::load_from_config` uses to decide whether health
/// state survives a reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    pub provider: String,
    #[serde(default)]
    pub priority: i32,
    pub max_connections: Option<u32>,
}

impl EndpointConfig {
    pub fn provider_kind(&self) -> anyhow::Result<ProviderKind> {
        ProviderKind::from_str(&self.provider)
            .map_err(|_| anyhow::anyhow!("unknown provider kind: {}", self.provider))
    }
}

/// Which selector strategy the binary wires up at startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectorConfig {
    #[default]
    Priority,
    RoundRobin,
    LeastConnections,
}

/// Which proxy engine variant serves requests, plus the retry/busy tuning
/// shared by whichever one is selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub engine: ProxyEngineKind,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Active-connection count above which an endpoint is treated as `Busy`
    /// for selection-weight purposes (spec.md §3's "Busy is set by the
    /// proxy engine, not the prober").
    #[serde(default = "default_busy_threshold")]
    pub busy_threshold: i64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_busy_threshold() -> i64 {
    10
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            engine: ProxyEngineKind::default(),
            max_retries: default_max_retries(),
            busy_threshold: default_busy_threshold(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProxyEngineKind {
    Simple,
    #[default]
    Fast,
}

/// HTTP server bind settings and request-level limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "olla_core::common::duration_serde")]
    pub response_timeout: Duration,
    /// `0` disables the limit (spec.md §8's "maxBodySize = 0 → no-op").
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 40114,
            response_timeout: Duration::from_secs(600),
            max_body_size: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            endpoints: Vec::new(),
            selector: SelectorConfig::default(),
            proxy: ProxyConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            health: HealthProberConfig::default(),
            discovery: DiscoveryConfig::default(),
            stats: StatsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(host) = env::var("OLLA_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Ok(port_str) = env::var("OLLA_PORT") {
            self.server.port = port_str
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid OLLA_PORT: {port_str}"))?;
        }
        if let Ok(level) = env::var("OLLA_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Schema + cross-field validation. Named `validate` (not
    /// `validate_schema`) since this crate has no separate env-override
    /// validation pass to distinguish it from.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("server host cannot be empty"));
        }
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("server port must be between 1 and 65535"));
        }

        let mut seen_names = std::collections::HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.name.is_empty() {
                return Err(anyhow::anyhow!("endpoint name cannot be empty"));
            }
            if !seen_names.insert(&endpoint.name) {
                return Err(anyhow::anyhow!("duplicate endpoint name: {}", endpoint.name));
            }
            if !endpoint.url.starts_with("http://") && !endpoint.url.starts_with("https://") {
                return Err(anyhow::anyhow!(
                    "endpoint {} url must start with http:// or https://",
                    endpoint.name
                ));
            }
            endpoint.provider_kind().map_err(|e| {
                anyhow::anyhow!("endpoint {}: {}", endpoint.name, e)
            })?;
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(anyhow::anyhow!("circuit_breaker.failure_threshold cannot be 0"));
        }

        Ok(())
    }
}
