//! Corpus loading into the dense store and the keyword index
//!
//! Both indexes receive the same document ids, raw text and metadata. The
//! dense store gets batched embeddings; the keyword index gets the
//! preprocessed text.

use crate::corpus::{encode_metadata, CorpusEntry, MetadataError};
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::preprocess::Preprocessor;
use crate::storage::{DenseRecord, DenseStore, KeywordIndex, KeywordIndexError};
use ahash::AHashSet;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("Duplicate document id '{0}' in corpus")]
    DuplicateId(String),

    #[error("Document '{0}' has no text")]
    EmptyText(String),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("Keyword index error: {0}")]
    KeywordIndex(#[from] KeywordIndexError),

    #[error("Dense store error: {0}")]
    Store(String),

    #[error("Metadata encoding failed: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Nothing to index into: no dense or sparse target configured")]
    NoTargets,
}

/// Outcome of one indexing run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexReport {
    /// Corpus entries processed
    pub indexed: usize,
    /// Records written to the dense store
    pub dense: usize,
    /// Documents written to the keyword index
    pub sparse: usize,
    pub duration_ms: u64,
}

struct DenseTarget {
    store: DenseStore,
    collection: String,
    embedder: Arc<dyn EmbeddingProvider>,
}

struct SparseTarget {
    index: KeywordIndex,
    preprocessor: Arc<dyn Preprocessor>,
}

/// Writes a corpus into the configured indexes
pub struct CorpusIndexer {
    dense: Option<DenseTarget>,
    sparse: Option<SparseTarget>,
    batch_size: usize,
}

impl CorpusIndexer {
    pub fn new() -> Self {
        Self {
            dense: None,
            sparse: None,
            batch_size: 32,
        }
    }

    /// Index into `collection` of a dense store, embedding with `embedder`
    pub fn with_dense(
        mut self,
        store: DenseStore,
        collection: impl Into<String>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        self.dense = Some(DenseTarget {
            store,
            collection: collection.into(),
            embedder,
        });
        self
    }

    /// Index into a writable keyword index, normalizing with `preprocessor`
    pub fn with_sparse(mut self, index: KeywordIndex, preprocessor: Arc<dyn Preprocessor>) -> Self {
        self.sparse = Some(SparseTarget {
            index,
            preprocessor,
        });
        self
    }

    /// Number of texts embedded per call
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Remove every document from the configured indexes
    pub fn clear(&mut self) -> Result<(), IndexingError> {
        if let Some(dense) = &self.dense {
            dense
                .store
                .drop_collection(&dense.collection)
                .map_err(|e| IndexingError::Store(e.to_string()))?;
            info!("Cleared dense collection '{}'", dense.collection);
        }

        if let Some(sparse) = &mut self.sparse {
            sparse.index.clear()?;
            info!("Cleared keyword index at {}", sparse.index.path().display());
        }

        Ok(())
    }

    /// Index a corpus, replacing documents that share an id with earlier runs
    pub fn index(&mut self, entries: &[CorpusEntry]) -> Result<IndexReport, IndexingError> {
        let start = Instant::now();
        let metadatas = self.prepare(entries)?;
        self.write(entries, &metadatas, start)
    }

    /// Replace everything in the configured indexes with `entries`.
    ///
    /// The corpus is checked before anything is cleared, so a rejected corpus
    /// leaves the previous indexes in place.
    pub fn rebuild(&mut self, entries: &[CorpusEntry]) -> Result<IndexReport, IndexingError> {
        let start = Instant::now();
        let metadatas = self.prepare(entries)?;
        self.clear()?;
        self.write(entries, &metadatas, start)
    }

    /// Check targets and entries, returning the encoded metadata per entry
    fn prepare(&self, entries: &[CorpusEntry]) -> Result<Vec<String>, IndexingError> {
        if self.dense.is_none() && self.sparse.is_none() {
            return Err(IndexingError::NoTargets);
        }

        validate_entries(entries)?;

        Ok(entries
            .iter()
            .map(|entry| encode_metadata(&entry.metadata))
            .collect::<Result<Vec<_>, _>>()?)
    }

    fn write(
        &mut self,
        entries: &[CorpusEntry],
        metadatas: &[String],
        start: Instant,
    ) -> Result<IndexReport, IndexingError> {
        info!("Indexing {} documents", entries.len());

        let mut report = IndexReport {
            indexed: entries.len(),
            ..Default::default()
        };

        if let Some(dense) = &self.dense {
            report.dense = index_dense(dense, entries, metadatas, self.batch_size)?;
        }

        if let Some(sparse) = &mut self.sparse {
            report.sparse = index_sparse(sparse, entries, metadatas)?;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Indexing complete: {} dense, {} sparse, {}ms",
            report.dense, report.sparse, report.duration_ms
        );

        Ok(report)
    }
}

impl Default for CorpusIndexer {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_entries(entries: &[CorpusEntry]) -> Result<(), IndexingError> {
    let mut seen = AHashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.document_id.as_str()) {
            return Err(IndexingError::DuplicateId(entry.document_id.clone()));
        }
        if entry.text.trim().is_empty() {
            return Err(IndexingError::EmptyText(entry.document_id.clone()));
        }
    }
    Ok(())
}

fn index_dense(
    target: &DenseTarget,
    entries: &[CorpusEntry],
    metadatas: &[String],
    batch_size: usize,
) -> Result<usize, IndexingError> {
    target
        .store
        .create_collection(
            &target.collection,
            target.embedder.model_name(),
            target.embedder.dimension(),
        )
        .map_err(|e| IndexingError::Store(e.to_string()))?;

    let mut written = 0;
    for (chunk, chunk_metadata) in entries.chunks(batch_size).zip(metadatas.chunks(batch_size)) {
        let texts: Vec<String> = chunk.iter().map(|entry| entry.text.clone()).collect();
        let embeddings = target.embedder.embed_batch(&texts)?;

        if embeddings.len() != chunk.len() {
            return Err(IndexingError::CountMismatch {
                expected: chunk.len(),
                actual: embeddings.len(),
            });
        }

        let records: Vec<DenseRecord> = chunk
            .iter()
            .zip(chunk_metadata)
            .zip(embeddings)
            .map(|((entry, metadata), embedding)| DenseRecord {
                document_id: entry.document_id.clone(),
                document: entry.text.clone(),
                metadata: metadata.clone(),
                embedding,
            })
            .collect();

        target
            .store
            .upsert_batch(&target.collection, &records)
            .map_err(|e| IndexingError::Store(e.to_string()))?;

        written += records.len();
        debug!("Embedded and stored {} documents", written);
    }

    Ok(written)
}

fn index_sparse(
    target: &mut SparseTarget,
    entries: &[CorpusEntry],
    metadatas: &[String],
) -> Result<usize, IndexingError> {
    for (entry, metadata) in entries.iter().zip(metadatas) {
        let tokens = target.preprocessor.preprocess(&entry.text);
        target
            .index
            .upsert(&entry.document_id, &tokens, &entry.text, metadata)?;
    }

    target.index.commit()?;
    debug!("Committed {} documents to keyword index", entries.len());

    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingProvider;
    use crate::preprocess::Bm25Preprocessor;
    use tempfile::TempDir;

    fn corpus() -> Vec<CorpusEntry> {
        vec![
            CorpusEntry::new("A", "space life support systems").with_metadata("year", 2019.0),
            CorpusEntry::new("B", "Martian soil chemistry"),
            CorpusEntry::new("C", "life support telemetry monitoring")
                .with_metadata("title", "Telemetry"),
        ]
    }

    fn indexer(dir: &TempDir) -> CorpusIndexer {
        let store = DenseStore::open_or_create(&dir.path().join("dense.sqlite")).unwrap();
        let index = KeywordIndex::open_or_create(&dir.path().join("sparse/abstracts")).unwrap();

        CorpusIndexer::new()
            .with_dense(store, "abstracts", Arc::new(HashingProvider::new(32).unwrap()))
            .with_sparse(index, Arc::new(Bm25Preprocessor::new()))
            .batch_size(2)
    }

    #[test]
    fn test_index_both_targets() {
        let dir = TempDir::new().unwrap();
        let report = indexer(&dir).index(&corpus()).unwrap();

        assert_eq!(report.indexed, 3);
        assert_eq!(report.dense, 3);
        assert_eq!(report.sparse, 3);

        let store = DenseStore::open(&dir.path().join("dense.sqlite")).unwrap();
        let info = store.collection_info("abstracts").unwrap().unwrap();
        assert_eq!(info.dimension, 32);
        assert_eq!(info.model, "hashing-32");

        let records = store.load_collection("abstracts").unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].metadata, r#"{"year":2019.0}"#);
    }

    #[test]
    fn test_reindex_replaces_documents() {
        let dir = TempDir::new().unwrap();
        let mut indexer = indexer(&dir);

        indexer.index(&corpus()).unwrap();
        indexer.index(&corpus()).unwrap();

        let store = DenseStore::open(&dir.path().join("dense.sqlite")).unwrap();
        assert_eq!(store.count("abstracts").unwrap(), 3);

        let index = KeywordIndex::open(&dir.path().join("sparse/abstracts")).unwrap();
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_clear_empties_targets() {
        let dir = TempDir::new().unwrap();
        let mut indexer = indexer(&dir);

        indexer.index(&corpus()).unwrap();
        indexer.clear().unwrap();

        let store = DenseStore::open(&dir.path().join("dense.sqlite")).unwrap();
        assert!(store.collection_info("abstracts").unwrap().is_none());

        let index = KeywordIndex::open(&dir.path().join("sparse/abstracts")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let dir = TempDir::new().unwrap();
        let mut entries = corpus();
        entries.push(CorpusEntry::new("A", "another text"));

        let result = indexer(&dir).index(&entries);
        assert!(matches!(result, Err(IndexingError::DuplicateId(id)) if id == "A"));
    }

    #[test]
    fn test_empty_text_rejected() {
        let dir = TempDir::new().unwrap();
        let result = indexer(&dir).index(&[CorpusEntry::new("A", "   ")]);
        assert!(matches!(result, Err(IndexingError::EmptyText(_))));
    }

    #[test]
    fn test_sparse_only() {
        let dir = TempDir::new().unwrap();
        let index = KeywordIndex::open_or_create(&dir.path().join("abstracts")).unwrap();

        let report = CorpusIndexer::new()
            .with_sparse(index, Arc::new(Bm25Preprocessor::new()))
            .index(&corpus())
            .unwrap();

        assert_eq!(report.dense, 0);
        assert_eq!(report.sparse, 3);
    }

    #[test]
    fn test_no_targets() {
        let result = CorpusIndexer::new().index(&corpus());
        assert!(matches!(result, Err(IndexingError::NoTargets)));
    }

    #[test]
    fn test_rebuild_replaces_documents() {
        let dir = TempDir::new().unwrap();
        let mut indexer = indexer(&dir);

        indexer.index(&corpus()).unwrap();
        let report = indexer
            .rebuild(&[CorpusEntry::new("Z", "lunar regolith sintering")])
            .unwrap();
        assert_eq!(report.indexed, 1);

        let store = DenseStore::open(&dir.path().join("dense.sqlite")).unwrap();
        assert_eq!(store.count("abstracts").unwrap(), 1);

        let index = KeywordIndex::open(&dir.path().join("sparse/abstracts")).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_rejected_rebuild_keeps_previous_corpus() {
        let dir = TempDir::new().unwrap();
        let mut indexer = indexer(&dir);
        indexer.index(&corpus()).unwrap();

        let duplicated = [
            CorpusEntry::new("X", "first"),
            CorpusEntry::new("X", "second"),
        ];
        let result = indexer.rebuild(&duplicated);
        assert!(matches!(result, Err(IndexingError::DuplicateId(id)) if id == "X"));

        let result = indexer.rebuild(&[CorpusEntry::new("Y", " ")]);
        assert!(matches!(result, Err(IndexingError::EmptyText(_))));

        let store = DenseStore::open(&dir.path().join("dense.sqlite")).unwrap();
        assert!(store.collection_info("abstracts").unwrap().is_some());
        assert_eq!(store.count("abstracts").unwrap(), 3);

        let index = KeywordIndex::open(&dir.path().join("sparse/abstracts")).unwrap();
        assert_eq!(index.len(), 3);
    }
}
