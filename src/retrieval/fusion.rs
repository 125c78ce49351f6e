//! Reciprocal Rank Fusion algorithm for combining full-corpus rankings

use ahash::{AHashMap, AHashSet};
use thiserror::Error;

/// Smoothing constant used unless configured otherwise
pub const DEFAULT_RRF_K: f64 = 60.0;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid weight {0}: weights must be positive and finite")]
    InvalidWeights(f64),

    #[error("Invalid RRF constant {0}: must be finite and non-negative")]
    InvalidConstant(f64),
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionConfig {
    /// RRF K constant, shared by every strategy in a fusion run
    pub rrf_k: f64,
}

impl FusionConfig {
    pub fn new(rrf_k: f64) -> Result<Self, FusionError> {
        if !rrf_k.is_finite() || rrf_k < 0.0 {
            return Err(FusionError::InvalidConstant(rrf_k));
        }
        Ok(Self { rrf_k })
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
        }
    }
}

/// One strategy's contribution to a fusion run
#[derive(Debug, Clone)]
pub struct StrategyRanks {
    pub name: String,
    weight: f64,
    /// document_id -> 1-based rank
    pub ranks: AHashMap<String, usize>,
}

impl StrategyRanks {
    pub fn new(name: impl Into<String>, ranks: impl IntoIterator<Item = (String, usize)>) -> Self {
        Self {
            name: name.into(),
            weight: 1.0,
            ranks: ranks.into_iter().collect(),
        }
    }

    /// Set the strategy weight; must be positive and finite
    pub fn with_weight(mut self, weight: f64) -> Result<Self, FusionError> {
        validate_weight(weight)?;
        self.weight = weight;
        Ok(self)
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }
}

pub(crate) fn validate_weight(weight: f64) -> Result<(), FusionError> {
    if weight.is_finite() && weight > 0.0 {
        Ok(())
    } else {
        Err(FusionError::InvalidWeights(weight))
    }
}

/// Combines per-strategy rankings into one fused ranking
pub trait RankFuser: Send + Sync {
    /// Fused `(document_id, score)` pairs, best first
    fn fuse(&self, rankings: &[StrategyRanks]) -> Vec<(String, f64)>;
}

/// Reciprocal Rank Fusion
#[derive(Debug, Clone, Default)]
pub struct ReciprocalRankFusion {
    config: FusionConfig,
}

impl ReciprocalRankFusion {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }
}

impl RankFuser for ReciprocalRankFusion {
    fn fuse(&self, rankings: &[StrategyRanks]) -> Vec<(String, f64)> {
        reciprocal_rank_fusion(rankings, &self.config)
    }
}

/// Apply Reciprocal Rank Fusion to N ranked lists
///
/// RRF formula: score(id) = sum over strategies of: weight / (k + rank + 1)
///
/// A document missing from a strategy is scored as if that strategy had
/// ranked it at (highest rank seen in this run + 1), so every document gets
/// exactly one contribution per strategy.
///
/// # Arguments
/// * `rankings` - one id -> rank map per strategy, in configured order
/// * `config` - Fusion configuration
///
/// # Returns
/// Fused results as (id, fused_score) pairs, sorted by score descending and
/// then by id ascending
pub fn reciprocal_rank_fusion(
    rankings: &[StrategyRanks],
    config: &FusionConfig,
) -> Vec<(String, f64)> {
    let padding_rank = rankings
        .iter()
        .flat_map(|strategy| strategy.ranks.values().copied())
        .max()
        .unwrap_or(0)
        + 1;

    let mut seen: AHashSet<&str> = AHashSet::new();
    let mut document_ids: Vec<&str> = Vec::new();
    for strategy in rankings {
        for id in strategy.ranks.keys() {
            if seen.insert(id.as_str()) {
                document_ids.push(id.as_str());
            }
        }
    }

    // Contributions are summed in strategy order so scores are reproducible
    let mut results: Vec<(String, f64)> = document_ids
        .into_iter()
        .map(|id| {
            let score = rankings
                .iter()
                .map(|strategy| {
                    let rank = strategy.ranks.get(id).copied().unwrap_or(padding_rank);
                    strategy.weight / (config.rrf_k + rank as f64 + 1.0)
                })
                .sum::<f64>();
            (id.to_string(), score)
        })
        .collect();

    results.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    results
}
