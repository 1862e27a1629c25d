//! Typed system configuration (SPEC_FULL.md §6). Loading/merging config
//! files from disk is an explicit external collaborator (§1 Non-goals);
//! this module only defines the shape every field is deserialized into.

use std::collections::HashMap;
use std::path::PathBuf;

use pdk_core::runner::RunnerKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub runner: RunnerSelectionConfig,
    pub executor: ExecutorConfig,
    pub artifacts: ArtifactStoreConfig,
    pub secrets: SecretStoreConfig,
    pub host_mode: HostModeConfig,
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            runner: RunnerSelectionConfig::default(),
            executor: ExecutorConfig::default(),
            artifacts: ArtifactStoreConfig::default(),
            secrets: SecretStoreConfig::default(),
            host_mode: HostModeConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSelectionConfig {
    pub default: RunnerKind,
    pub max_parallel_jobs: usize,
}

impl Default for RunnerSelectionConfig {
    fn default() -> Self {
        Self {
            default: RunnerKind::Container,
            max_parallel_jobs: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExecutorConfig {
    pub images: HashMap<String, String>,
    pub network_mode: String,
    pub memory_limit_mb: Option<u64>,
    pub cpu_limit: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactStoreConfig {
    pub base_path: PathBuf,
    pub default_retention_days: u32,
}

impl Default for ArtifactStoreConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from(".pdk/artifacts"),
            default_retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretStoreConfig {
    pub store_path: PathBuf,
    pub key_path: PathBuf,
}

impl Default for SecretStoreConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(".pdk/secrets.json"),
            key_path: PathBuf::from(".pdk/secrets.key"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HostModeConfig {
    pub warning_acknowledged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = SystemConfig::default();
        assert_eq!(config.runner.default, RunnerKind::Container);
        assert_eq!(config.runner.max_parallel_jobs, 4);
        assert_eq!(config.artifacts.default_retention_days, 30);
        assert_eq!(config.log_level, "info");
        assert!(!config.host_mode.warning_acknowledged);
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let config: SystemConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.runner.default, RunnerKind::Container);
        assert_eq!(config.secrets.store_path, PathBuf::from(".pdk/secrets.json"));
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let config: SystemConfig =
            serde_json::from_str(r#"{"log_level": "debug", "runner": {"max_parallel_jobs": 8}}"#).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.runner.max_parallel_jobs, 8);
        assert_eq!(config.runner.default, RunnerKind::Container);
    }
}
