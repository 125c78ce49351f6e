//! Hybrid retrieval: full-corpus strategies fused with Reciprocal Rank Fusion
//!
//! Every strategy ranks the whole corpus for a query. The composite retriever
//! fuses those rankings on ranks alone, so strategies with incommensurable
//! scores (vector distance, BM25) can be combined.

mod composite;
mod dense;
mod expansion;
mod fusion;
mod ranking;
mod sparse;

pub use composite::{
    CompositeRanking, CompositeRetriever, Hit, RetrievalResults, Strategy, StrategyBuilder,
};
pub use dense::{DenseRetriever, DistanceMetric};
pub use expansion::{FnExpander, IdentityExpander, QueryExpander};
pub use fusion::{
    reciprocal_rank_fusion, FusionConfig, FusionError, RankFuser, ReciprocalRankFusion,
    StrategyRanks, DEFAULT_RRF_K,
};
pub use ranking::{RankingResult, ScoreOrder, ScoredDocument, TopK};
pub use sparse::SparseRetriever;

use crate::embedding::EmbeddingError;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Cannot connect to collection '{collection}' at {location}: {reason}")]
    Connection {
        location: String,
        collection: String,
        reason: String,
    },

    #[error("Invalid strategy configuration: {0}")]
    Configuration(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query expansion failed: {0}")]
    Expansion(String),

    #[error("Document '{0}' is not present in any strategy")]
    Unresolved(String),
}

impl RetrievalError {
    pub(crate) fn connection(
        location: &Path,
        collection: &str,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::Connection {
            location: location.display().to_string(),
            collection: collection.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A query in the form one strategy consumes
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Raw or preprocessed text
    Text(String),
    /// Pre-embedded query vector
    Vector(Vec<f32>),
}

impl Query {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Vector(_) => None,
        }
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<f32>> for Query {
    fn from(vector: Vec<f32>) -> Self {
        Self::Vector(vector)
    }
}

/// A retrieval backend bound to one persisted collection
///
/// Retrievers only exist once connected, so a query can never reach an
/// unbound backend. Implementations are read-only and safe to share across
/// threads.
pub trait Retriever: Send + Sync {
    /// Bind to the collection `collection` stored at `location`
    fn connect(location: &Path, collection: &str) -> Result<Self, RetrievalError>
    where
        Self: Sized;

    /// Rank every corpus entry for `query`
    ///
    /// The result is total over the corpus with ranks 1..=N. An empty corpus
    /// yields an empty ranking.
    fn rank_all(&self, query: &Query) -> Result<RankingResult, RetrievalError>;

    /// The best `k` entries, best-first; `k` is clamped to the corpus size
    fn top_k(&self, query: &Query, k: usize) -> Result<TopK, RetrievalError> {
        Ok(self.rank_all(query)?.top_k(k))
    }

    /// Number of documents in the bound collection
    fn corpus_size(&self) -> usize;

    /// Short backend name used in logs
    fn kind(&self) -> &'static str;
}
