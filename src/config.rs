//! YAML-backed configuration, loaded once at startup and overridden by CLI
//! flags. Unknown keys are ignored so older config files keep working across
//! additions; every field has a spec-mandated default so a bare `{}` document
//! is a valid, fully-functional configuration.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::matcher::Strategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub target: TargetConfig,
    pub storage: StorageConfig,
    pub cors: CorsConfig,
    pub chaos: ChaosConfig,
    pub matching: MatchingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            target: TargetConfig::default(),
            storage: StorageConfig::default(),
            cors: CorsConfig::default(),
            chaos: ChaosConfig::default(),
            matching: MatchingConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_yaml::from_str(&raw)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub mode: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            mode: "mock".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub url: Option<String>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: "lowdb".to_string(),
            path: "./mocks/db.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaosConfig {
    pub enabled: bool,
    pub latency: Option<ChaosLatencyConfig>,
    #[serde(rename = "errorRate")]
    pub error_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaosLatencyConfig {
    pub min: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub strategy: Strategy,
    #[serde(rename = "ignoreHeaders")]
    pub ignore_headers: BTreeSet<String>,
    #[serde(rename = "ignoreQueryParams")]
    pub ignore_query_params: BTreeSet<String>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        let defaults = crate::matcher::MatcherConfig::default();
        Self {
            strategy: defaults.strategy,
            ignore_headers: defaults.ignored_headers,
            ignore_query_params: defaults.ignored_query_params,
        }
    }
}

impl From<MatchingConfig> for crate::matcher::MatcherConfig {
    fn from(cfg: MatchingConfig) -> Self {
        crate::matcher::MatcherConfig {
            strategy: cfg.strategy,
            ignored_headers: cfg.ignore_headers,
            ignored_query_params: cfg.ignore_query_params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_documented_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.server.port, 3001);
        assert_eq!(cfg.server.mode, "mock");
        assert_eq!(cfg.storage.kind, "lowdb");
        assert_eq!(cfg.storage.path, "./mocks/db.json");
        assert!(cfg.cors.enabled);
        assert!(!cfg.chaos.enabled);
        assert!(matches!(cfg.matching.strategy, Strategy::Smart));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let yaml = "server:\n  port: 4000\n  bogus: true\nextra_top_level: 1\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.server.port, 4000);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let yaml = "chaos:\n  enabled: true\n  errorRate: 0.1\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.chaos.enabled);
        assert_eq!(cfg.chaos.error_rate, Some(0.1));
        assert_eq!(cfg.server.port, 3001);
    }
}
