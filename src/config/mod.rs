//! Configuration management for paperfuse
//!
//! Handles loading, environment overrides and validation of the TOML
//! configuration that describes the data directory, the embedding model, the
//! two indexes and the ordered list of retrieval strategies.

use crate::error::{PaperfuseError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub dense: DenseConfig,
    pub sparse: SparseConfig,
    pub fusion: FusionSettings,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Holds `dense.sqlite` and `sparse/<collection>/`
    pub data_dir: PathBuf,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "fastembed" or "hashing"
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
}

/// Dense index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseConfig {
    pub collection: String,
    /// "cosine" or "l2"
    pub metric: String,
}

/// Sparse index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseConfig {
    pub collection: String,
}

/// Rank fusion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionSettings {
    pub rrf_k: f64,
}

/// Offline evaluation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub max_concurrent: usize,
    pub hit_cutoff: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            hit_cutoff: 10,
        }
    }
}

/// One entry of the ordered strategy list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    /// "dense" or "sparse"; required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retriever: Option<String>,
    /// Embed the query before ranking
    #[serde(default)]
    pub embed: bool,
    /// "bm25" or "none". Dense strategies take raw text; every sparse
    /// strategy must name the preprocessor the keyword index was built with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preprocess: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl StrategyConfig {
    pub fn new(name: impl Into<String>, retriever: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            retriever: Some(retriever.into()),
            embed: false,
            preprocess: None,
            weight: default_weight(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PaperfuseError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| PaperfuseError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;

        Self::from_toml(&content)
    }

    /// Parse, apply environment overrides and validate
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load `path` when given, else the default file, else built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = Self::default_path()?;
        if default_path.exists() {
            return Self::load(&default_path);
        }

        tracing::debug!(
            "No config at {}, using built-in defaults",
            default_path.display()
        );
        let mut config = Self::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PaperfuseError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| PaperfuseError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: PAPERFUSE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    fn apply_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("PAPERFUSE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "FUSION__RRF_K" => {
                self.fusion.rrf_k = value.parse().map_err(|_| PaperfuseError::InvalidConfigValue {
                    path: path.to_string(),
                    message: format!("Cannot parse '{}' as a number", value),
                })?;
            }
            "EMBEDDING__PROVIDER" => {
                self.embedding.provider = value.to_string();
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "STORAGE__DATA_DIR" => {
                self.storage.data_dir = PathBuf::from(value);
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Data directory with `~` expanded
    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.storage.data_dir)
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            PaperfuseError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("paperfuse").join("config.toml"))
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

impl Default for Config {
    fn default() -> Self {
        let mut dense = StrategyConfig::new("dense", "dense");
        dense.embed = true;

        let mut sparse = StrategyConfig::new("sparse", "sparse");
        sparse.preprocess = Some("bm25".to_string());

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.paperfuse"),
            },
            embedding: EmbeddingConfig {
                provider: "fastembed".to_string(),
                model: "all-MiniLM-L6-v2".to_string(),
                dimension: 384,
                batch_size: 32,
            },
            dense: DenseConfig {
                collection: "abstracts".to_string(),
                metric: "cosine".to_string(),
            },
            sparse: SparseConfig {
                collection: "abstracts".to_string(),
            },
            fusion: FusionSettings { rrf_k: 60.0 },
            evaluation: EvaluationConfig::default(),
            strategies: vec![dense, sparse],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_roundtrips_through_toml() {
        let config = Config::default();
        let content = toml::to_string_pretty(&config).unwrap();
        let parsed = Config::from_toml(&content).unwrap();

        assert_eq!(parsed.strategies.len(), 2);
        assert_eq!(parsed.strategies[1].preprocess.as_deref(), Some("bm25"));
        assert!(parsed.strategies[0].embed);
        assert_eq!(parsed.fusion.rrf_k, 60.0);
    }

    #[test]
    fn test_strategy_defaults() {
        let content = r#"
            [_meta]
            schema_version = "1.0.0"

            [storage]
            data_dir = "/tmp/paperfuse"

            [embedding]
            provider = "hashing"
            model = "hashing"
            dimension = 64
            batch_size = 8

            [dense]
            collection = "abstracts"
            metric = "l2"

            [sparse]
            collection = "abstracts"

            [fusion]
            rrf_k = 60.0

            [[strategies]]
            name = "sparse"
            retriever = "sparse"
        "#;

        let config: Config = toml::from_str(content).unwrap();
        let strategy = &config.strategies[0];
        assert_eq!(strategy.weight, 1.0);
        assert!(!strategy.embed);
        assert!(strategy.preprocess.is_none());
        assert_eq!(config.evaluation.hit_cutoff, 10);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vec![
            ("PAPERFUSE_FUSION__RRF_K".to_string(), "10".to_string()),
            ("PAPERFUSE_EMBEDDING__PROVIDER".to_string(), "hashing".to_string()),
            ("PAPERFUSE_STORAGE__DATA_DIR".to_string(), "/srv/data".to_string()),
            ("OTHER_VAR".to_string(), "ignored".to_string()),
        ]);

        assert_eq!(config.fusion.rrf_k, 10.0);
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.data_dir(), PathBuf::from("/srv/data"));
    }

    #[test]
    fn test_bad_env_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(vec![(
            "PAPERFUSE_FUSION__RRF_K".to_string(),
            "sixty".to_string(),
        )]);
        assert_eq!(config.fusion.rrf_k, 60.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.embedding.provider = "hashing".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.embedding.provider, "hashing");
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = Config::load(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(PaperfuseError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path(Path::new("/abs/dir")), PathBuf::from("/abs/dir"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path(Path::new("~/.paperfuse")), home.join(".paperfuse"));
        }
    }
}
