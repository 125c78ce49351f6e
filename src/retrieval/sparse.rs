//! Sparse retrieval: BM25 over a preprocessed keyword index

use super::{Query, RankingResult, RetrievalError, Retriever, ScoreOrder, ScoredDocument};
use crate::corpus::decode_metadata;
use crate::storage::KeywordIndex;
use std::path::Path;

/// Sparse strategy bound to one keyword index.
///
/// Text queries are expected to be normalized the same way the corpus was at
/// index time; the strategy's preprocessor takes care of that in a composite
/// setup. Every live document is scored against whole-index statistics.
pub struct SparseRetriever {
    collection: String,
    index: KeywordIndex,
}

impl SparseRetriever {
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl Retriever for SparseRetriever {
    /// `location` is the root directory holding one index per collection
    fn connect(location: &Path, collection: &str) -> Result<Self, RetrievalError> {
        let index_path = location.join(collection);
        let index = KeywordIndex::open(&index_path)
            .map_err(|e| RetrievalError::connection(location, collection, e))?;

        tracing::info!(
            "Connected sparse collection '{}' ({} documents)",
            collection,
            index.len()
        );

        Ok(Self {
            collection: collection.to_string(),
            index,
        })
    }

    fn rank_all(&self, query: &Query) -> Result<RankingResult, RetrievalError> {
        let text = query.as_text().ok_or_else(|| {
            RetrievalError::InvalidQuery(format!(
                "sparse collection '{}' accepts text queries only",
                self.collection
            ))
        })?;

        let terms = self.index.query_terms(text);
        tracing::debug!("Sparse query terms: {:?}", terms);

        let hits = self
            .index
            .score_all(&terms)
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        let mut scored = Vec::with_capacity(hits.len());
        for hit in hits {
            let metadata = decode_metadata(&hit.metadata).map_err(|e| {
                RetrievalError::Storage(format!(
                    "bad metadata for {}: {}",
                    hit.document_id, e
                ))
            })?;

            scored.push(ScoredDocument {
                document_id: hit.document_id,
                score: hit.score,
                document: hit.document,
                metadata,
            });
        }

        Ok(RankingResult::from_scored(scored, ScoreOrder::Descending))
    }

    fn corpus_size(&self) -> usize {
        self.index.len() as usize
    }

    fn kind(&self) -> &'static str {
        "sparse"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{Bm25Preprocessor, Preprocessor};
    use tempfile::TempDir;

    fn build_index(dir: &TempDir, docs: &[(&str, &str)]) {
        let preprocessor = Bm25Preprocessor::new();
        let mut index = KeywordIndex::open_or_create(&dir.path().join("abstracts")).unwrap();
        for (id, text) in docs {
            index
                .upsert(id, &preprocessor.preprocess(text), text, r#"{"source":"sparse"}"#)
                .unwrap();
        }
        index.commit().unwrap();
    }

    fn life_support_corpus(dir: &TempDir) {
        build_index(
            dir,
            &[
                ("A", "space life support systems"),
                ("B", "Martian soil chemistry"),
                ("C", "life support telemetry monitoring"),
            ],
        );
    }

    #[test]
    fn test_bm25_ranking_order() {
        let dir = TempDir::new().unwrap();
        life_support_corpus(&dir);

        let retriever = SparseRetriever::connect(dir.path(), "abstracts").unwrap();
        let query = Bm25Preprocessor::new().preprocess("life support monitoring");
        let ranking = retriever.rank_all(&Query::Text(query)).unwrap();

        assert_eq!(ranking.document_ids(), &["C", "A", "B"]);
        assert_eq!(ranking.ranks(), &[1, 2, 3]);
        assert_eq!(ranking.scores()[2], 0.0);
        assert_eq!(ranking.documents()[0], "life support telemetry monitoring");
        assert_eq!(
            ranking.metadatas()[0].get("source").and_then(|v| v.as_str()),
            Some("sparse")
        );
    }

    #[test]
    fn test_no_matching_terms_ranks_by_id() {
        let dir = TempDir::new().unwrap();
        life_support_corpus(&dir);

        let retriever = SparseRetriever::connect(dir.path(), "abstracts").unwrap();
        let ranking = retriever.rank_all(&Query::text("volcano")).unwrap();

        assert_eq!(ranking.document_ids(), &["A", "B", "C"]);
        assert!(ranking.scores().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_vector_query_rejected() {
        let dir = TempDir::new().unwrap();
        life_support_corpus(&dir);

        let retriever = SparseRetriever::connect(dir.path(), "abstracts").unwrap();
        let result = retriever.rank_all(&Query::Vector(vec![1.0]));
        assert!(matches!(result, Err(RetrievalError::InvalidQuery(_))));
    }

    #[test]
    fn test_connect_missing_collection() {
        let dir = TempDir::new().unwrap();
        let result = SparseRetriever::connect(dir.path(), "abstracts");
        assert!(matches!(result, Err(RetrievalError::Connection { .. })));
    }

    #[test]
    fn test_empty_index() {
        let dir = TempDir::new().unwrap();
        build_index(&dir, &[]);

        let retriever = SparseRetriever::connect(dir.path(), "abstracts").unwrap();
        assert_eq!(retriever.corpus_size(), 0);
        assert!(retriever.rank_all(&Query::text("life")).unwrap().is_empty());
    }
}
