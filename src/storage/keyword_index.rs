/// Tantivy keyword index for BM25 scoring over preprocessed text
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::indexer::NoMergePolicy;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT};
use tantivy::tokenizer::{TextAnalyzer, TokenStream};
use tantivy::{
    doc, DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index was opened read-only")]
    ReadOnly,

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A document as scored against one query
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub document_id: String,
    /// BM25 relevance score, 0.0 when no query term matches
    pub score: f32,
    /// Raw document text
    pub document: String,
    /// Encoded metadata (JSON object)
    pub metadata: String,
}

/// Tantivy keyword index wrapper
///
/// Stores the raw document and its metadata next to the preprocessed tokens,
/// so a sparse collection is self-contained.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: Option<IndexWriter>,
    document_id_field: Field,
    document_field: Field,
    tokens_field: Field,
    metadata_field: Field,
    analyzer: TextAnalyzer,
    index_path: PathBuf,
}

impl KeywordIndex {
    /// Open an existing index for reading only
    pub fn open(index_path: &Path) -> Result<Self, KeywordIndexError> {
        if !Self::exists(index_path) {
            return Err(KeywordIndexError::IndexNotFound(
                index_path.display().to_string(),
            ));
        }

        let index = Index::open_in_dir(index_path)
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Self::from_index(index, index_path, false)
    }

    /// Open an index for writing, creating it if missing
    pub fn open_or_create(index_path: &Path) -> Result<Self, KeywordIndexError> {
        let index = if Self::exists(index_path) {
            Index::open_in_dir(index_path)
                .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?
        } else {
            std::fs::create_dir_all(index_path)?;
            Index::create_in_dir(index_path, Self::schema())
                .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?
        };

        Self::from_index(index, index_path, true)
    }

    /// Whether an index has been created at `index_path`
    pub fn exists(index_path: &Path) -> bool {
        index_path.join("meta.json").exists()
    }

    fn schema() -> Schema {
        let mut schema_builder = Schema::builder();
        schema_builder.add_text_field("document_id", STRING | STORED);
        schema_builder.add_text_field("document", STORED);
        schema_builder.add_text_field("tokens", TEXT);
        schema_builder.add_text_field("metadata", STORED);
        schema_builder.build()
    }

    fn from_index(
        index: Index,
        index_path: &Path,
        writable: bool,
    ) -> Result<Self, KeywordIndexError> {
        let schema = index.schema();
        let field = |name: &str| {
            schema.get_field(name).map_err(|_| {
                KeywordIndexError::InitializationError(format!(
                    "Missing '{}' field in schema",
                    name
                ))
            })
        };

        let document_id_field = field("document_id")?;
        let document_field = field("document")?;
        let tokens_field = field("tokens")?;
        let metadata_field = field("metadata")?;

        let analyzer = index
            .tokenizer_for_field(tokens_field)
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        let writer = if writable {
            let writer: IndexWriter = index
                .writer(50_000_000) // 50MB buffer
                .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;
            // Merges only happen in commit()
            writer.set_merge_policy(Box::new(NoMergePolicy));
            Some(writer)
        } else {
            None
        };

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer,
            document_id_field,
            document_field,
            tokens_field,
            metadata_field,
            analyzer,
            index_path: index_path.to_path_buf(),
        })
    }

    fn writer(&mut self) -> Result<&mut IndexWriter, KeywordIndexError> {
        self.writer.as_mut().ok_or(KeywordIndexError::ReadOnly)
    }

    /// Insert a document, replacing any document with the same id
    ///
    /// # Arguments
    /// * `document_id` - Shared document id
    /// * `tokens` - Preprocessed text, whitespace separated
    /// * `document` - Raw text returned to callers
    /// * `metadata` - Encoded metadata
    pub fn upsert(
        &mut self,
        document_id: &str,
        tokens: &str,
        document: &str,
        metadata: &str,
    ) -> Result<(), KeywordIndexError> {
        let document_id_field = self.document_id_field;
        let doc = doc!(
            self.document_id_field => document_id,
            self.document_field => document,
            self.tokens_field => tokens,
            self.metadata_field => metadata,
        );

        let writer = self.writer()?;
        writer.delete_term(Term::from_field_text(document_id_field, document_id));
        writer
            .add_document(doc)
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        Ok(())
    }

    /// Commit all pending changes
    ///
    /// Replaced documents stay counted in BM25 statistics until their segment
    /// is merged, so segments holding deletes are merged before returning.
    pub fn commit(&mut self) -> Result<(), KeywordIndexError> {
        self.writer()?
            .commit()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        self.reload()?;

        let has_deletes = self
            .reader
            .searcher()
            .segment_readers()
            .iter()
            .any(|segment| segment.has_deletes());

        if has_deletes {
            let segment_ids = self
                .index
                .searchable_segment_ids()
                .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
            self.writer()?
                .merge(&segment_ids)
                .wait()
                .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
            self.reload()?;
        }

        Ok(())
    }

    fn reload(&self) -> Result<(), KeywordIndexError> {
        self.reader
            .reload()
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))
    }

    /// Delete every document and commit
    pub fn clear(&mut self) -> Result<(), KeywordIndexError> {
        self.writer()?
            .delete_all_documents()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        self.commit()
    }

    /// Split query text into index terms with the field's own analyzer
    pub fn query_terms(&self, text: &str) -> Vec<String> {
        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(text);

        let mut terms = Vec::new();
        while stream.advance() {
            let term = stream.token().text.clone();
            if !terms.contains(&term) {
                terms.push(term);
            }
        }
        terms
    }

    /// Score every live document against the query terms.
    ///
    /// BM25 statistics come from the whole index. Documents matching no term
    /// are returned with a score of 0.0. Output order is unspecified.
    pub fn score_all(&self, terms: &[String]) -> Result<Vec<KeywordHit>, KeywordIndexError> {
        let searcher = self.reader.searcher();

        let all_docs = searcher
            .search(&AllQuery, &DocSetCollector)
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        if all_docs.is_empty() {
            return Ok(Vec::new());
        }

        let mut scores: HashMap<DocAddress, f32> = HashMap::new();
        if !terms.is_empty() {
            let clauses: Vec<(Occur, Box<dyn Query>)> = terms
                .iter()
                .map(|term| {
                    let term = Term::from_field_text(self.tokens_field, term);
                    let query: Box<dyn Query> =
                        Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                    (Occur::Should, query)
                })
                .collect();

            let matched = searcher
                .search(
                    &BooleanQuery::new(clauses),
                    &TopDocs::with_limit(all_docs.len()),
                )
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

            scores.extend(matched.into_iter().map(|(score, address)| (address, score)));
        }

        let mut hits = Vec::with_capacity(all_docs.len());
        for address in all_docs {
            let retrieved: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

            let text = |field: Field| {
                retrieved
                    .get_first(field)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            };

            let document_id = text(self.document_id_field).ok_or_else(|| {
                KeywordIndexError::SearchError("Missing or invalid document_id field".to_string())
            })?;

            hits.push(KeywordHit {
                document_id,
                score: scores.get(&address).copied().unwrap_or(0.0),
                document: text(self.document_field).unwrap_or_default(),
                metadata: text(self.metadata_field).unwrap_or_else(|| "{}".to_string()),
            });
        }

        Ok(hits)
    }

    /// Get the number of documents in the index
    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.index_path
    }
}
