//! Full-corpus rankings produced by retrieval strategies

use crate::corpus::Metadata;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Which direction of a strategy's native score is better
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOrder {
    /// Lower is better (distances)
    Ascending,
    /// Higher is better (lexical relevance)
    Descending,
}

/// A corpus entry with a strategy-native score, before ranking
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document_id: String,
    pub score: f32,
    pub document: String,
    pub metadata: Metadata,
}

/// One strategy's ranking of the entire corpus for one query.
///
/// The sequences are parallel and sorted best-first. Ranks run 1..=N without
/// gaps or repeats, and document ids are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankingResult {
    document_ids: Vec<String>,
    ranks: Vec<usize>,
    scores: Vec<f32>,
    documents: Vec<String>,
    metadatas: Vec<Metadata>,
}

impl RankingResult {
    /// Sort scored documents best-first and assign ranks 1..=N.
    ///
    /// Ties on score are broken by `document_id`. NaN scores sort last.
    /// When the same id appears more than once, only its best entry is kept.
    pub fn from_scored(mut entries: Vec<ScoredDocument>, order: ScoreOrder) -> Self {
        entries.sort_by(|a, b| {
            sort_key(a.score, order)
                .total_cmp(&sort_key(b.score, order))
                .then_with(|| a.document_id.cmp(&b.document_id))
        });

        let mut seen = HashSet::with_capacity(entries.len());
        entries.retain(|entry| seen.insert(entry.document_id.clone()));

        let mut result = Self {
            document_ids: Vec::with_capacity(entries.len()),
            ranks: Vec::with_capacity(entries.len()),
            scores: Vec::with_capacity(entries.len()),
            documents: Vec::with_capacity(entries.len()),
            metadatas: Vec::with_capacity(entries.len()),
        };

        for (position, entry) in entries.into_iter().enumerate() {
            result.document_ids.push(entry.document_id);
            result.ranks.push(position + 1);
            result.scores.push(entry.score);
            result.documents.push(entry.document);
            result.metadatas.push(entry.metadata);
        }

        result
    }

    pub fn len(&self) -> usize {
        self.document_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document_ids.is_empty()
    }

    pub fn document_ids(&self) -> &[String] {
        &self.document_ids
    }

    pub fn ranks(&self) -> &[usize] {
        &self.ranks
    }

    pub fn scores(&self) -> &[f32] {
        &self.scores
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn metadatas(&self) -> &[Metadata] {
        &self.metadatas
    }

    /// Mapping from document id to rank, the fusion input
    pub fn rank_map(&self) -> HashMap<String, usize> {
        self.document_ids
            .iter()
            .cloned()
            .zip(self.ranks.iter().copied())
            .collect()
    }

    /// Position index from document id to its row
    pub fn position_index(&self) -> HashMap<&str, usize> {
        self.document_ids
            .iter()
            .enumerate()
            .map(|(position, id)| (id.as_str(), position))
            .collect()
    }

    /// Rank of a document, if this ranking contains it
    pub fn rank_of(&self, document_id: &str) -> Option<usize> {
        self.document_ids
            .iter()
            .position(|id| id == document_id)
            .map(|position| self.ranks[position])
    }

    /// The best `k` entries; `k` is clamped to the corpus size
    pub fn top_k(mut self, k: usize) -> TopK {
        let k = k.min(self.len());
        self.document_ids.truncate(k);
        self.scores.truncate(k);
        self.documents.truncate(k);
        self.metadatas.truncate(k);

        TopK {
            document_ids: self.document_ids,
            documents: self.documents,
            scores: self.scores,
            metadatas: self.metadatas,
        }
    }
}

/// Best `k` entries of one strategy, best-first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopK {
    pub document_ids: Vec<String>,
    pub documents: Vec<String>,
    /// Strategy-native scores; not comparable across strategies
    pub scores: Vec<f32>,
    pub metadatas: Vec<Metadata>,
}

impl TopK {
    pub fn len(&self) -> usize {
        self.document_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document_ids.is_empty()
    }
}

/// Lower key is better regardless of the strategy's score direction
fn sort_key(score: f32, order: ScoreOrder) -> f32 {
    if score.is_nan() {
        return f32::INFINITY;
    }

    let key = match order {
        ScoreOrder::Ascending => score,
        ScoreOrder::Descending => -score,
    };

    // -0.0 and 0.0 are the same score
    if key == 0.0 {
        0.0
    } else {
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(id: &str, score: f32) -> ScoredDocument {
        ScoredDocument {
            document_id: id.to_string(),
            score,
            document: format!("doc {}", id),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_descending_ranks_are_dense() {
        let ranking = RankingResult::from_scored(
            vec![scored("a", 0.5), scored("b", 2.0), scored("c", 1.0)],
            ScoreOrder::Descending,
        );

        assert_eq!(ranking.document_ids(), &["b", "c", "a"]);
        assert_eq!(ranking.ranks(), &[1, 2, 3]);
        assert_eq!(ranking.documents()[0], "doc b");
    }

    #[test]
    fn test_ascending_with_ties_break_on_id() {
        let ranking = RankingResult::from_scored(
            vec![scored("z", 0.1), scored("m", 0.1), scored("a", 0.3)],
            ScoreOrder::Ascending,
        );

        assert_eq!(ranking.document_ids(), &["m", "z", "a"]);
        assert_eq!(ranking.ranks(), &[1, 2, 3]);
    }

    #[test]
    fn test_nan_sorts_last() {
        let ranking = RankingResult::from_scored(
            vec![scored("a", f32::NAN), scored("b", 0.0), scored("c", -1.0)],
            ScoreOrder::Descending,
        );
        assert_eq!(ranking.document_ids(), &["b", "c", "a"]);

        let ranking = RankingResult::from_scored(
            vec![scored("a", f32::NAN), scored("b", 5.0)],
            ScoreOrder::Ascending,
        );
        assert_eq!(ranking.document_ids(), &["b", "a"]);
    }

    #[test]
    fn test_negative_zero_ties_with_zero() {
        let ranking = RankingResult::from_scored(
            vec![scored("b", 0.0), scored("a", -0.0)],
            ScoreOrder::Descending,
        );
        assert_eq!(ranking.document_ids(), &["a", "b"]);
    }

    #[test]
    fn test_duplicate_ids_keep_best() {
        let ranking = RankingResult::from_scored(
            vec![scored("a", 1.0), scored("a", 3.0), scored("b", 2.0)],
            ScoreOrder::Descending,
        );

        assert_eq!(ranking.document_ids(), &["a", "b"]);
        assert_eq!(ranking.scores(), &[3.0, 2.0]);
        assert_eq!(ranking.ranks(), &[1, 2]);
    }

    #[test]
    fn test_empty_ranking() {
        let ranking = RankingResult::from_scored(Vec::new(), ScoreOrder::Descending);
        assert!(ranking.is_empty());
        assert!(ranking.top_k(10).is_empty());
    }

    #[test]
    fn test_top_k_clamps_and_matches_prefix() {
        let ranking = RankingResult::from_scored(
            vec![scored("a", 3.0), scored("b", 2.0), scored("c", 1.0)],
            ScoreOrder::Descending,
        );

        let full = ranking.clone().top_k(50);
        assert_eq!(full.len(), 3);

        let top = ranking.clone().top_k(2);
        assert_eq!(top.document_ids, &ranking.document_ids()[..2]);
        assert_eq!(top.scores, vec![3.0, 2.0]);
    }

    #[test]
    fn test_rank_lookup() {
        let ranking = RankingResult::from_scored(
            vec![scored("a", 3.0), scored("b", 2.0)],
            ScoreOrder::Descending,
        );

        assert_eq!(ranking.rank_of("b"), Some(2));
        assert_eq!(ranking.rank_of("missing"), None);
        assert_eq!(ranking.rank_map()["a"], 1);
        assert_eq!(ranking.position_index()["b"], 1);
    }
}
