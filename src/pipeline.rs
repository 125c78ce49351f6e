//! Startup wiring: stores, strategies and the composite retriever from `Config`
//!
//! Index connections are made once here and handed to callers explicitly.

use crate::config::{Config, EmbeddingConfig, StrategyConfig};
use crate::corpus::CorpusEntry;
use crate::embedding::{EmbeddingProvider, FastEmbedProvider, HashingProvider};
use crate::error::{PaperfuseError, Result};
use crate::indexing::{CorpusIndexer, IndexReport, IndexingError};
use crate::preprocess::{Bm25Preprocessor, NullPreprocessor, Preprocessor};
use crate::retrieval::{
    CompositeRetriever, DenseRetriever, DistanceMetric, FusionConfig, ReciprocalRankFusion,
    RetrievalError, Retriever, SparseRetriever, Strategy,
};
use crate::storage::{DenseStore, KeywordIndex, StorageLayout};
use std::sync::Arc;

/// Build the configured embedding provider
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
        "fastembed" => Arc::new(
            FastEmbedProvider::new(&config.model).map_err(RetrievalError::Embedding)?,
        ),
        "hashing" => {
            Arc::new(HashingProvider::new(config.dimension).map_err(RetrievalError::Embedding)?)
        }
        other => {
            return Err(PaperfuseError::InvalidConfigValue {
                path: "embedding.provider".to_string(),
                message: format!("Unknown provider '{}'", other),
            })
        }
    };

    Ok(embedder)
}

/// Build a named preprocessor; `None` means no preprocessing
pub fn build_preprocessor(name: Option<&str>) -> Result<Option<Arc<dyn Preprocessor>>> {
    match name {
        None => Ok(None),
        Some("none") => Ok(Some(Arc::new(NullPreprocessor))),
        Some("bm25") => Ok(Some(Arc::new(Bm25Preprocessor::new()))),
        Some(other) => Err(PaperfuseError::InvalidConfigValue {
            path: "strategies.preprocess".to_string(),
            message: format!("Unknown preprocessor '{}'", other),
        }),
    }
}

/// Everything derived from one configuration
pub struct Pipeline {
    config: Config,
    layout: StorageLayout,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let layout = StorageLayout::new(config.data_dir());
        Self {
            config,
            layout,
            embedder: None,
        }
    }

    /// Use this embedder instead of building one from the configuration
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    fn embedder(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        match &self.embedder {
            Some(embedder) => Ok(Arc::clone(embedder)),
            None => build_embedder(&self.config.embedding),
        }
    }

    /// Preprocessor applied to corpus text in the keyword index; it matches
    /// the one the first sparse strategy applies to queries
    fn sparse_preprocessor(&self) -> Result<Arc<dyn Preprocessor>> {
        let configured = self
            .config
            .strategies
            .iter()
            .find(|s| s.retriever.as_deref() == Some("sparse"))
            .and_then(|s| s.preprocess.as_deref());

        Ok(build_preprocessor(configured)?.unwrap_or_else(|| Arc::new(NullPreprocessor)))
    }

    /// Load a corpus into both configured indexes
    pub fn index(&self, entries: &[CorpusEntry], rebuild: bool) -> Result<IndexReport> {
        self.layout.ensure()?;

        let store = DenseStore::open_or_create(&self.layout.dense_db_path())?;
        let keyword_index = KeywordIndex::open_or_create(
            &self.layout.sparse_collection_dir(&self.config.sparse.collection),
        )
        .map_err(IndexingError::from)?;

        let mut indexer = CorpusIndexer::new()
            .with_dense(store, &self.config.dense.collection, self.embedder()?)
            .with_sparse(keyword_index, self.sparse_preprocessor()?)
            .batch_size(self.config.embedding.batch_size);

        let report = if rebuild {
            indexer.rebuild(entries)?
        } else {
            indexer.index(entries)?
        };

        Ok(report)
    }

    /// Connect every configured strategy and assemble the composite retriever
    pub fn connect(&self) -> Result<CompositeRetriever> {
        let strategies = &self.config.strategies;
        let uses = |kind: &str| {
            strategies
                .iter()
                .any(|s| s.retriever.as_deref() == Some(kind))
        };

        let embedder = if strategies.iter().any(|s| s.embed) {
            Some(self.embedder()?)
        } else {
            None
        };

        let dense: Option<Arc<dyn Retriever>> = if uses("dense") {
            Some(Arc::new(self.connect_dense(embedder.clone())?))
        } else {
            None
        };

        let sparse: Option<Arc<dyn Retriever>> = if uses("sparse") {
            Some(Arc::new(SparseRetriever::connect(
                &self.layout.sparse_root(),
                &self.config.sparse.collection,
            )?))
        } else {
            None
        };

        let mut built = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            built.push(self.build_strategy(strategy, &dense, &sparse, &embedder)?);
        }

        let fusion = FusionConfig::new(self.config.fusion.rrf_k).map_err(|e| {
            PaperfuseError::InvalidConfigValue {
                path: "fusion.rrf_k".to_string(),
                message: e.to_string(),
            }
        })?;

        let composite = CompositeRetriever::new(built)?
            .with_fuser(Arc::new(ReciprocalRankFusion::new(fusion)));

        tracing::info!(
            "Composite retriever ready: {}",
            composite
                .strategies()
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(composite)
    }

    fn connect_dense(
        &self,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<DenseRetriever> {
        let metric: DistanceMetric =
            self.config
                .dense
                .metric
                .parse()
                .map_err(|message| PaperfuseError::InvalidConfigValue {
                    path: "dense.metric".to_string(),
                    message,
                })?;

        let retriever = DenseRetriever::connect(
            &self.layout.dense_db_path(),
            &self.config.dense.collection,
        )?
        .with_metric(metric);

        Ok(match embedder {
            Some(embedder) => retriever.with_embedder(embedder)?,
            None => retriever,
        })
    }

    fn build_strategy(
        &self,
        config: &StrategyConfig,
        dense: &Option<Arc<dyn Retriever>>,
        sparse: &Option<Arc<dyn Retriever>>,
        embedder: &Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Strategy> {
        let mut builder = Strategy::builder(&config.name).weight(config.weight);

        let retriever = match config.retriever.as_deref() {
            Some("dense") => dense.clone(),
            Some("sparse") => sparse.clone(),
            Some(other) => {
                return Err(RetrievalError::Configuration(format!(
                    "strategy '{}' names unknown retriever '{}'",
                    config.name, other
                ))
                .into())
            }
            None => None,
        };
        if let Some(retriever) = retriever {
            builder = builder.retriever(retriever);
        }

        if let Some(preprocessor) = build_preprocessor(config.preprocess.as_deref())? {
            builder = builder.preprocessor(preprocessor);
        }

        if config.embed {
            if let Some(embedder) = embedder {
                builder = builder.embedder(Arc::clone(embedder));
            }
        }

        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn hashing_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.embedding.provider = "hashing".to_string();
        config.embedding.dimension = 64;
        config
    }

    fn corpus() -> Vec<CorpusEntry> {
        vec![
            CorpusEntry::new("A", "space life support systems"),
            CorpusEntry::new("B", "Martian soil chemistry"),
            CorpusEntry::new("C", "life support telemetry monitoring"),
        ]
    }

    #[test]
    fn test_build_preprocessor() {
        assert!(build_preprocessor(None).unwrap().is_none());
        assert_eq!(
            build_preprocessor(Some("bm25")).unwrap().unwrap().name(),
            "bm25"
        );
        assert!(build_preprocessor(Some("stem")).is_err());
    }

    #[test]
    fn test_index_then_connect() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(hashing_config(&dir));

        let report = pipeline.index(&corpus(), false).unwrap();
        assert_eq!(report.indexed, 3);

        let composite = pipeline.connect().unwrap();
        assert_eq!(composite.strategies().len(), 2);

        let results = composite.retrieve("life support monitoring", 10).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_connect_before_index_fails() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(hashing_config(&dir));

        let result = pipeline.connect();
        assert!(matches!(
            result,
            Err(PaperfuseError::Retrieval(RetrievalError::Connection { .. }))
        ));
    }

    #[test]
    fn test_missing_retriever_binding() {
        let dir = TempDir::new().unwrap();
        let mut config = hashing_config(&dir);
        let pipeline = Pipeline::new(config.clone());
        pipeline.index(&corpus(), false).unwrap();

        config.strategies[1].retriever = None;
        let result = Pipeline::new(config).connect();
        assert!(matches!(
            result,
            Err(PaperfuseError::Retrieval(RetrievalError::Configuration(_)))
        ));
    }

    #[test]
    fn test_rebuild_replaces_corpus() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(hashing_config(&dir));

        pipeline.index(&corpus(), false).unwrap();
        pipeline
            .index(&[CorpusEntry::new("Z", "only document left")], true)
            .unwrap();

        let composite = pipeline.connect().unwrap();
        let results = composite.retrieve("document", 10).unwrap();
        assert_eq!(results.document_ids, vec!["Z"]);
    }

    #[test]
    fn test_failed_rebuild_keeps_corpus_queryable() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(hashing_config(&dir));
        pipeline.index(&corpus(), false).unwrap();

        let duplicated = [
            CorpusEntry::new("X", "replacement text"),
            CorpusEntry::new("X", "replacement text again"),
        ];
        let result = pipeline.index(&duplicated, true);
        assert!(matches!(
            result,
            Err(PaperfuseError::Indexing(IndexingError::DuplicateId(_)))
        ));

        let composite = pipeline.connect().unwrap();
        let results = composite.retrieve("life support systems", 10).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.document_ids.contains(&"A".to_string()));
    }
}
