use crate::config::Config;
use crate::embedding::{fastembed_dimension, FASTEMBED_MODELS};
use crate::error::{PaperfuseError, Result, ValidationError};
use ahash::AHashSet;
use regex::Regex;

const EMBEDDING_PROVIDERS: &[&str] = &["fastembed", "hashing"];
const DISTANCE_METRICS: &[&str] = &["cosine", "l2"];
const RETRIEVERS: &[&str] = &["dense", "sparse"];
const PREPROCESSORS: &[&str] = &["bm25", "none"];

/// Collection names double as directory names and SQLite keys
const COLLECTION_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";
const RESERVED_COLLECTION_NAMES: &[&str] = &["corpus"];

/// Evaluation reports the fused ranking under this name
const RESERVED_STRATEGY_NAMES: &[&str] = &["fused"];

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem found
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_collections(config, &mut errors);
        Self::validate_fusion(config, &mut errors);
        Self::validate_evaluation(config, &mut errors);
        Self::validate_strategies(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PaperfuseError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let embedding = &config.embedding;

        if !EMBEDDING_PROVIDERS.contains(&embedding.provider.as_str()) {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    EMBEDDING_PROVIDERS, embedding.provider
                ),
            ));
        }

        if embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        if embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if embedding.provider == "fastembed" {
            match fastembed_dimension(&embedding.model) {
                Some(dimension) if dimension != embedding.dimension => {
                    errors.push(ValidationError::new(
                        "embedding.dimension",
                        format!(
                            "Model {} produces {}D vectors, configured {}",
                            embedding.model, dimension, embedding.dimension
                        ),
                    ));
                }
                Some(_) => {}
                None => errors.push(ValidationError::new(
                    "embedding.model",
                    format!(
                        "Unsupported fastembed model '{}', expected one of {:?}",
                        embedding.model, FASTEMBED_MODELS
                    ),
                )),
            }
        }
    }

    fn validate_collections(config: &Config, errors: &mut Vec<ValidationError>) {
        Self::validate_collection_name("dense.collection", &config.dense.collection, errors);
        Self::validate_collection_name("sparse.collection", &config.sparse.collection, errors);

        if !DISTANCE_METRICS.contains(&config.dense.metric.as_str()) {
            errors.push(ValidationError::new(
                "dense.metric",
                format!(
                    "Metric must be one of {:?}, got '{}'",
                    DISTANCE_METRICS, config.dense.metric
                ),
            ));
        }
    }

    fn validate_collection_name(path: &str, name: &str, errors: &mut Vec<ValidationError>) {
        let pattern = match Regex::new(COLLECTION_NAME_PATTERN) {
            Ok(pattern) => pattern,
            Err(e) => {
                errors.push(ValidationError::new(path, format!("Invalid pattern: {}", e)));
                return;
            }
        };

        if !pattern.is_match(name) {
            errors.push(ValidationError::new(
                path,
                format!(
                    "Collection name '{}' must start with a letter or underscore and \
                     contain only letters, digits and underscores",
                    name
                ),
            ));
        } else if RESERVED_COLLECTION_NAMES.contains(&name) {
            errors.push(ValidationError::new(
                path,
                format!("Collection name '{}' is reserved", name),
            ));
        }
    }

    fn validate_fusion(config: &Config, errors: &mut Vec<ValidationError>) {
        let k = config.fusion.rrf_k;
        if !k.is_finite() || k < 0.0 {
            errors.push(ValidationError::new(
                "fusion.rrf_k",
                format!("RRF constant must be a non-negative number, got {}", k),
            ));
        }
    }

    fn validate_evaluation(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.evaluation.max_concurrent == 0 {
            errors.push(ValidationError::new(
                "evaluation.max_concurrent",
                "Concurrency must be greater than 0",
            ));
        }

        if config.evaluation.hit_cutoff == 0 {
            errors.push(ValidationError::new(
                "evaluation.hit_cutoff",
                "Hit cutoff must be greater than 0",
            ));
        }
    }

    fn validate_strategies(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.strategies.is_empty() {
            errors.push(ValidationError::new(
                "strategies",
                "At least one strategy is required",
            ));
        }

        let mut names = AHashSet::new();
        let mut sparse_preprocess: Option<&str> = None;
        for (i, strategy) in config.strategies.iter().enumerate() {
            let path = format!("strategies[{}]", i);

            if strategy.name.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("{}.name", path),
                    "Strategy name cannot be empty",
                ));
            } else if RESERVED_STRATEGY_NAMES.contains(&strategy.name.as_str()) {
                errors.push(ValidationError::new(
                    format!("{}.name", path),
                    format!("Strategy name '{}' is reserved", strategy.name),
                ));
            } else if !names.insert(strategy.name.as_str()) {
                errors.push(ValidationError::new(
                    format!("{}.name", path),
                    format!("Duplicate strategy name '{}'", strategy.name),
                ));
            }

            match strategy.retriever.as_deref() {
                None => errors.push(ValidationError::new(
                    format!("{}.retriever", path),
                    "Missing required 'retriever' binding",
                )),
                Some(retriever) if !RETRIEVERS.contains(&retriever) => {
                    errors.push(ValidationError::new(
                        format!("{}.retriever", path),
                        format!(
                            "Retriever must be one of {:?}, got '{}'",
                            RETRIEVERS, retriever
                        ),
                    ))
                }
                Some("sparse") if strategy.embed => errors.push(ValidationError::new(
                    format!("{}.embed", path),
                    "A sparse retriever cannot take embedded queries",
                )),
                Some(_) => {}
            }

            if let Some(preprocess) = &strategy.preprocess {
                if !PREPROCESSORS.contains(&preprocess.as_str()) {
                    errors.push(ValidationError::new(
                        format!("{}.preprocess", path),
                        format!(
                            "Preprocessor must be one of {:?}, got '{}'",
                            PREPROCESSORS, preprocess
                        ),
                    ));
                }
            }

            // Corpus text is indexed once: raw for dense, with one preprocessor for sparse
            let preprocess = strategy.preprocess.as_deref().unwrap_or("none");
            if PREPROCESSORS.contains(&preprocess) {
                match strategy.retriever.as_deref() {
                    Some("dense") if preprocess != "none" => {
                        errors.push(ValidationError::new(
                            format!("{}.preprocess", path),
                            format!(
                                "A dense retriever indexes raw text and cannot use '{}'",
                                preprocess
                            ),
                        ))
                    }
                    Some("sparse") => match sparse_preprocess {
                        None => sparse_preprocess = Some(preprocess),
                        Some(indexed) if indexed != preprocess => {
                            errors.push(ValidationError::new(
                                format!("{}.preprocess", path),
                                format!(
                                    "Sparse strategies share one keyword index built with \
                                     '{}', got '{}'",
                                    indexed, preprocess
                                ),
                            ))
                        }
                        Some(_) => {}
                    },
                    _ => {}
                }
            }

            if !(strategy.weight.is_finite() && strategy.weight > 0.0) {
                errors.push(ValidationError::new(
                    format!("{}.weight", path),
                    format!("Weight must be positive, got {}", strategy.weight),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;

    fn error_paths(config: &Config) -> Vec<String> {
        match ConfigValidator::validate(config) {
            Err(PaperfuseError::ConfigValidation { errors }) => {
                errors.into_iter().map(|e| e.path).collect()
            }
            Ok(()) => Vec::new(),
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_provider() {
        let mut config = Config::default();
        config.embedding.provider = "invalid".to_string();
        assert_eq!(error_paths(&config), vec!["embedding.provider"]);
    }

    #[test]
    fn test_fastembed_dimension_must_match_model() {
        let mut config = Config::default();
        config.embedding.dimension = 768;
        assert_eq!(error_paths(&config), vec!["embedding.dimension"]);

        config.embedding.provider = "hashing".to_string();
        assert!(error_paths(&config).is_empty());
    }

    #[test]
    fn test_collection_names() {
        let mut config = Config::default();
        config.dense.collection = "9lives".to_string();
        config.sparse.collection = "corpus".to_string();

        assert_eq!(
            error_paths(&config),
            vec!["dense.collection", "sparse.collection"]
        );

        config.dense.collection = "my-abstracts".to_string();
        config.sparse.collection = "_abstracts_v2".to_string();
        assert_eq!(error_paths(&config), vec!["dense.collection"]);
    }

    #[test]
    fn test_negative_rrf_k() {
        let mut config = Config::default();
        config.fusion.rrf_k = -1.0;
        assert_eq!(error_paths(&config), vec!["fusion.rrf_k"]);
    }

    #[test]
    fn test_strategy_errors_accumulate() {
        let mut config = Config::default();
        let mut missing_retriever = StrategyConfig::new("dense", "dense");
        missing_retriever.retriever = None;
        missing_retriever.weight = 0.0;

        config.strategies.push(missing_retriever);

        assert_eq!(
            error_paths(&config),
            vec![
                "strategies[2].name",
                "strategies[2].retriever",
                "strategies[2].weight"
            ]
        );
    }

    #[test]
    fn test_unknown_retriever_and_preprocessor() {
        let mut config = Config::default();
        let mut strategy = StrategyConfig::new("graph", "graph");
        strategy.preprocess = Some("lemmatize".to_string());
        config.strategies = vec![strategy];

        assert_eq!(
            error_paths(&config),
            vec!["strategies[0].retriever", "strategies[0].preprocess"]
        );
    }

    #[test]
    fn test_sparse_cannot_embed() {
        let mut config = Config::default();
        config.strategies[1].embed = true;
        assert_eq!(error_paths(&config), vec!["strategies[1].embed"]);
    }

    #[test]
    fn test_sparse_strategies_share_preprocessor() {
        let mut config = Config::default();
        let mut raw = StrategyConfig::new("sparse_raw", "sparse");
        raw.preprocess = Some("none".to_string());
        config.strategies.push(raw);

        assert_eq!(error_paths(&config), vec!["strategies[2].preprocess"]);

        // Unset means no preprocessing, which also differs from bm25
        config.strategies[2].preprocess = None;
        assert_eq!(error_paths(&config), vec!["strategies[2].preprocess"]);

        config.strategies[2].preprocess = Some("bm25".to_string());
        assert!(error_paths(&config).is_empty());
    }

    #[test]
    fn test_dense_rejects_preprocessing() {
        let mut config = Config::default();
        config.strategies[0].preprocess = Some("bm25".to_string());
        assert_eq!(error_paths(&config), vec!["strategies[0].preprocess"]);

        config.strategies[0].preprocess = Some("none".to_string());
        assert!(error_paths(&config).is_empty());
    }

    #[test]
    fn test_reserved_strategy_name() {
        let mut config = Config::default();
        config.strategies[0].name = "fused".to_string();
        assert_eq!(error_paths(&config), vec!["strategies[0].name"]);
    }

    #[test]
    fn test_empty_strategies() {
        let mut config = Config::default();
        config.strategies.clear();
        assert_eq!(error_paths(&config), vec!["strategies"]);
    }
}
