//! Process-wide configuration: retrieval policy, vector dimension, and the
//! on-disk locations of the hot index, hot store, and cold store.
//!
//! Every value has a default matching the reference deployment; every
//! default can be overridden by a `DMR_*` environment variable.

use retriever::RetrievalPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level configuration for the `dmr` binary.
#[derive(Debug, Clone)]
pub struct DmrConfig {
    pub policy: RetrievalPolicy,
    pub vector_dim: usize,
    pub hot_index_dir: PathBuf,
    pub hot_store_path: PathBuf,
    pub cold_store_path: PathBuf,
}

/// Errors loading a YAML configuration file for batch/offline runs.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// YAML-shaped mirror of [`DmrConfig`] for offline/batch invocations that
/// don't want to thread `DMR_*` environment variables through. Every field
/// defaults to the same value `DmrConfig::default()` uses, so a minimal
/// file (just `version: "1.0"`) is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DmrYamlConfig {
    pub version: String,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_k_final")]
    pub k_final: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_k_candidates")]
    pub k_hot_candidates: usize,
    #[serde(default = "default_k_candidates")]
    pub k_cold_candidates: usize,
    #[serde(default = "default_budget_ms_hot")]
    pub budget_ms_hot: f64,
    #[serde(default = "default_budget_ms_cold")]
    pub budget_ms_cold: f64,
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,
    #[serde(default = "default_hot_index_dir")]
    pub hot_index_dir: String,
    #[serde(default = "default_hot_store_path")]
    pub hot_store_path: String,
    #[serde(default = "default_cold_store_path")]
    pub cold_store_path: String,
}

fn default_threshold() -> f32 {
    0.60
}
fn default_k_final() -> usize {
    5
}
fn default_max_chars() -> usize {
    1200
}
fn default_k_candidates() -> usize {
    20
}
fn default_budget_ms_hot() -> f64 {
    10.0
}
fn default_budget_ms_cold() -> f64 {
    30.0
}
fn default_vector_dim() -> usize {
    vectorizer::DIM
}
fn default_hot_index_dir() -> String {
    "./dmr_hot_index".to_string()
}
fn default_hot_store_path() -> String {
    "./dmr_hot.redb".to_string()
}
fn default_cold_store_path() -> String {
    "./dmr_cold.redb".to_string()
}

impl DmrYamlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let parsed: DmrYamlConfig = serde_yaml::from_str(yaml)?;
        match parsed.version.as_str() {
            "1.0" | "1" => Ok(parsed),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }
    }
}

impl From<DmrYamlConfig> for DmrConfig {
    fn from(y: DmrYamlConfig) -> Self {
        Self {
            policy: RetrievalPolicy {
                threshold: y.threshold,
                k_final: y.k_final,
                max_chars: y.max_chars,
                k_hot_candidates: y.k_hot_candidates,
                k_cold_candidates: y.k_cold_candidates,
                budget_ms_hot: y.budget_ms_hot,
                budget_ms_cold: y.budget_ms_cold,
            },
            vector_dim: y.vector_dim,
            hot_index_dir: PathBuf::from(y.hot_index_dir),
            hot_store_path: PathBuf::from(y.hot_store_path),
            cold_store_path: PathBuf::from(y.cold_store_path),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_or_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl DmrConfig {
    /// Load configuration from the process environment, falling back to the
    /// same defaults as the reference deployment.
    pub fn from_env() -> Self {
        let vector_dim = env_or("DMR_VECTOR_DIM", vectorizer::DIM);

        let policy = RetrievalPolicy {
            threshold: env_or("DMR_THRESHOLD", 0.60),
            k_final: env_or("DMR_K_FINAL", 5),
            max_chars: env_or("DMR_MAX_CHARS", 1200),
            k_hot_candidates: env_or("DMR_K_HOT_CANDIDATES", 20),
            k_cold_candidates: env_or("DMR_K_COLD_CANDIDATES", 20),
            budget_ms_hot: env_or("DMR_BUDGET_MS_HOT", 10.0),
            budget_ms_cold: env_or("DMR_BUDGET_MS_COLD", 30.0),
        };

        Self {
            policy,
            vector_dim,
            hot_index_dir: PathBuf::from(env_or_str("DMR_HOT_INDEX_DIR", "./dmr_hot_index")),
            hot_store_path: PathBuf::from(env_or_str("DMR_HOT_STORE_PATH", "./dmr_hot.redb")),
            cold_store_path: PathBuf::from(env_or_str("DMR_COLD_STORE_PATH", "./dmr_cold.redb")),
        }
    }
}

impl Default for DmrConfig {
    fn default() -> Self {
        Self {
            policy: RetrievalPolicy::default(),
            vector_dim: vectorizer::DIM,
            hot_index_dir: PathBuf::from("./dmr_hot_index"),
            hot_store_path: PathBuf::from("./dmr_hot.redb"),
            cold_store_path: PathBuf::from("./dmr_cold.redb"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment_dataclass_defaults() {
        let cfg = DmrConfig::default();
        assert_eq!(cfg.vector_dim, 20);
        assert_eq!(cfg.policy.k_final, 5);
    }

    #[test]
    fn yaml_config_defaults_match_env_defaults_when_only_version_given() {
        let y = DmrYamlConfig::from_yaml("version: \"1.0\"\n").unwrap();
        let cfg: DmrConfig = y.into();
        assert_eq!(cfg.policy.max_chars, 1200);
        assert_eq!(cfg.policy.k_hot_candidates, 20);
        assert_eq!(cfg.policy.budget_ms_hot, 10.0);
        assert_eq!(cfg.policy.budget_ms_cold, 30.0);
    }

    #[test]
    fn yaml_config_overrides_take_effect() {
        let y = DmrYamlConfig::from_yaml("version: \"1.0\"\nthreshold: 0.2\nk_final: 3\n").unwrap();
        let cfg: DmrConfig = y.into();
        assert_eq!(cfg.policy.threshold, 0.2);
        assert_eq!(cfg.policy.k_final, 3);
    }

    #[test]
    fn yaml_config_rejects_unsupported_version() {
        let err = DmrYamlConfig::from_yaml("version: \"2.0\"\n").unwrap_err();
        assert!(matches!(err, ConfigLoadError::UnsupportedVersion(_)));
    }
}
