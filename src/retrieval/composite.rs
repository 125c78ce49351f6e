//! Composite retriever: runs every strategy, fuses, and assembles the top K

use super::{
    FusionConfig, Query, QueryExpander, RankFuser, RankingResult, ReciprocalRankFusion,
    RetrievalError, Retriever, StrategyRanks, TopK,
};
use crate::corpus::{merge_first_wins, Metadata};
use crate::embedding::EmbeddingProvider;
use crate::preprocess::Preprocessor;
use ahash::AHashSet;
use serde::Serialize;
use std::sync::Arc;

/// One configured retrieval strategy: optional preprocessing, optional
/// embedding, and the backend that ranks the transformed query.
pub struct Strategy {
    name: String,
    preprocessor: Option<Arc<dyn Preprocessor>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    retriever: Arc<dyn Retriever>,
    weight: f64,
}

impl Strategy {
    pub fn builder(name: impl Into<String>) -> StrategyBuilder {
        StrategyBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn retriever(&self) -> &dyn Retriever {
        self.retriever.as_ref()
    }

    /// Turn a raw query into this strategy's query form
    pub fn prepare(&self, raw: &str) -> Result<Query, RetrievalError> {
        let text = match &self.preprocessor {
            Some(preprocessor) => preprocessor.preprocess(raw),
            None => raw.to_string(),
        };

        match &self.embedder {
            Some(embedder) => Ok(Query::Vector(embedder.embed(&text)?)),
            None => Ok(Query::Text(text)),
        }
    }

    /// Full-corpus ranking for a raw query
    pub fn rank_all(&self, raw: &str) -> Result<RankingResult, RetrievalError> {
        let query = self.prepare(raw)?;
        self.retriever.rank_all(&query)
    }

    /// Best `k` entries for a raw query, in this strategy alone
    pub fn top_k(&self, raw: &str, k: usize) -> Result<TopK, RetrievalError> {
        let query = self.prepare(raw)?;
        self.retriever.top_k(&query, k)
    }
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("name", &self.name)
            .field("retriever", &self.retriever.kind())
            .field("preprocessor", &self.preprocessor.as_ref().map(|p| p.name().to_string()))
            .field("embedder", &self.embedder.as_ref().map(|e| e.model_name().to_string()))
            .field("weight", &self.weight)
            .finish()
    }
}

/// Builder for [`Strategy`]
pub struct StrategyBuilder {
    name: String,
    preprocessor: Option<Arc<dyn Preprocessor>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    retriever: Option<Arc<dyn Retriever>>,
    weight: f64,
}

impl StrategyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preprocessor: None,
            embedder: None,
            retriever: None,
            weight: 1.0,
        }
    }

    pub fn preprocessor(mut self, preprocessor: Arc<dyn Preprocessor>) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn build(self) -> Result<Strategy, RetrievalError> {
        if self.name.trim().is_empty() {
            return Err(RetrievalError::Configuration(
                "strategy name cannot be empty".to_string(),
            ));
        }

        let retriever = self.retriever.ok_or_else(|| {
            RetrievalError::Configuration(format!(
                "strategy '{}' has no retriever bound",
                self.name
            ))
        })?;

        super::fusion::validate_weight(self.weight).map_err(|e| {
            RetrievalError::Configuration(format!("strategy '{}': {}", self.name, e))
        })?;

        Ok(Strategy {
            name: self.name,
            preprocessor: self.preprocessor,
            embedder: self.embedder,
            retriever,
            weight: self.weight,
        })
    }
}

/// Per-strategy rankings and their fusion for one query
#[derive(Debug, Clone)]
pub struct CompositeRanking {
    /// (strategy name, full ranking), in configured order
    pub strategies: Vec<(String, RankingResult)>,
    /// (document_id, fused score), best first
    pub fused: Vec<(String, f64)>,
}

impl CompositeRanking {
    /// 1-based fused position of a document
    pub fn fused_position(&self, document_id: &str) -> Option<usize> {
        self.fused
            .iter()
            .position(|(id, _)| id == document_id)
            .map(|position| position + 1)
    }
}

/// Fused retrieval output: parallel sequences in fused order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResults {
    pub document_ids: Vec<String>,
    pub documents: Vec<String>,
    /// Fused scores, non-increasing
    pub scores: Vec<f64>,
    pub metadatas: Vec<Metadata>,
}

impl RetrievalResults {
    pub fn len(&self) -> usize {
        self.document_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document_ids.is_empty()
    }

    pub fn hits(&self) -> impl Iterator<Item = Hit<'_>> {
        (0..self.len()).map(move |i| Hit {
            rank: i + 1,
            document_id: &self.document_ids[i],
            document: &self.documents[i],
            score: self.scores[i],
            metadata: &self.metadatas[i],
        })
    }
}

/// One fused result
#[derive(Debug, Clone, Serialize)]
pub struct Hit<'a> {
    pub rank: usize,
    pub document_id: &'a str,
    pub document: &'a str,
    pub score: f64,
    pub metadata: &'a Metadata,
}

impl Hit<'_> {
    /// First `max_chars` characters of the document on a single line
    pub fn preview(&self, max_chars: usize) -> String {
        let flat = self.document.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() <= max_chars {
            flat
        } else {
            let cut: String = flat.chars().take(max_chars).collect();
            format!("{}...", cut.trim_end())
        }
    }
}

/// Orchestrates strategies and fusion for end-to-end retrieval
pub struct CompositeRetriever {
    strategies: Vec<Strategy>,
    fuser: Arc<dyn RankFuser>,
    expander: Option<Arc<dyn QueryExpander>>,
}

impl CompositeRetriever {
    /// Create a composite over `strategies` fused with default RRF.
    ///
    /// Strategy order sets metadata precedence: on key collisions the first
    /// strategy wins.
    pub fn new(strategies: Vec<Strategy>) -> Result<Self, RetrievalError> {
        if strategies.is_empty() {
            return Err(RetrievalError::Configuration(
                "at least one strategy is required".to_string(),
            ));
        }

        let mut names = AHashSet::new();
        for strategy in &strategies {
            if !names.insert(strategy.name()) {
                return Err(RetrievalError::Configuration(format!(
                    "duplicate strategy name '{}'",
                    strategy.name()
                )));
            }
        }

        Ok(Self {
            strategies,
            fuser: Arc::new(ReciprocalRankFusion::new(FusionConfig::default())),
            expander: None,
        })
    }

    pub fn with_fuser(mut self, fuser: Arc<dyn RankFuser>) -> Self {
        self.fuser = fuser;
        self
    }

    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn strategy(&self, name: &str) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.name() == name)
    }

    /// Rank the corpus with every strategy and fuse the rankings
    pub fn rank(&self, query: &str) -> Result<CompositeRanking, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }

        let expanded = match &self.expander {
            Some(expander) => expander.expand(query)?,
            None => query.to_string(),
        };

        let mut strategies = Vec::with_capacity(self.strategies.len());
        let mut inputs = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let ranking = strategy.rank_all(&expanded)?;
            tracing::debug!(
                "Strategy '{}' ranked {} documents",
                strategy.name(),
                ranking.len()
            );

            let ranks = StrategyRanks::new(strategy.name(), ranking.rank_map())
                .with_weight(strategy.weight())
                .map_err(|e| {
                    RetrievalError::Configuration(format!("strategy '{}': {}", strategy.name(), e))
                })?;
            inputs.push(ranks);
            strategies.push((strategy.name().to_string(), ranking));
        }

        let fused = self.fuser.fuse(&inputs);

        Ok(CompositeRanking { strategies, fused })
    }

    /// Fused top `k` for `query`; `k` is clamped to the fused ranking size
    pub fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResults, RetrievalError> {
        let ranking = self.rank(query)?;
        let results = Self::assemble(&ranking, k)?;

        tracing::info!(
            "Retrieved {} of {} documents across {} strategies",
            results.len(),
            ranking.fused.len(),
            self.strategies.len()
        );

        Ok(results)
    }

    /// Alias of [`CompositeRetriever::retrieve`]
    pub fn top_k(&self, query: &str, k: usize) -> Result<RetrievalResults, RetrievalError> {
        self.retrieve(query, k)
    }

    fn assemble(ranking: &CompositeRanking, k: usize) -> Result<RetrievalResults, RetrievalError> {
        let k = k.min(ranking.fused.len());
        let positions: Vec<_> = ranking
            .strategies
            .iter()
            .map(|(_, result)| result.position_index())
            .collect();

        let mut results = RetrievalResults {
            document_ids: Vec::with_capacity(k),
            documents: Vec::with_capacity(k),
            scores: Vec::with_capacity(k),
            metadatas: Vec::with_capacity(k),
        };

        for (document_id, score) in ranking.fused.iter().take(k) {
            let mut document = None;
            let mut metadata = Metadata::new();

            for ((name, result), index) in ranking.strategies.iter().zip(&positions) {
                match index.get(document_id.as_str()) {
                    Some(&row) => {
                        if document.is_none() {
                            document = Some(result.documents()[row].clone());
                        }
                        merge_first_wins(&mut metadata, &result.metadatas()[row]);
                    }
                    None => tracing::warn!(
                        "Document '{}' not found in strategy '{}', skipping its contribution",
                        document_id,
                        name
                    ),
                }
            }

            let document =
                document.ok_or_else(|| RetrievalError::Unresolved(document_id.clone()))?;

            results.document_ids.push(document_id.clone());
            results.documents.push(document);
            results.scores.push(*score);
            results.metadatas.push(metadata);
        }

        Ok(results)
    }
}
