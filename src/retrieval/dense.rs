//! Dense retrieval: exact nearest-neighbour ranking over stored embeddings

use super::{Query, RankingResult, RetrievalError, Retriever, ScoreOrder, ScoredDocument};
use crate::corpus::{decode_metadata, Metadata};
use crate::embedding::EmbeddingProvider;
use crate::storage::{CollectionInfo, DenseStore};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Distance between a query vector and a stored vector; lower is closer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cos(q, v)`; 1.0 when either vector has zero norm
    #[default]
    Cosine,
    /// Squared Euclidean distance
    L2,
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(Self::Cosine),
            "l2" => Ok(Self::L2),
            other => Err(format!("unknown distance metric '{}'", other)),
        }
    }
}

/// Dense strategy bound to one collection of the dense store.
///
/// The collection is loaded once at connect time into a row-major matrix and
/// every query is scored against every row, so rankings are exact and total.
pub struct DenseRetriever {
    location: PathBuf,
    info: CollectionInfo,
    metric: DistanceMetric,
    document_ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<Metadata>,
    vectors: Array2<f32>,
    norms: Vec<f32>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl DenseRetriever {
    /// Attach the embedder used for text queries.
    ///
    /// Fails when the embedder's dimension differs from the one the
    /// collection was built with.
    pub fn with_embedder(
        mut self,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, RetrievalError> {
        if embedder.dimension() != self.info.dimension {
            return Err(RetrievalError::connection(
                &self.location,
                &self.info.name,
                format!(
                    "collection was built with {} ({}D), embedder {} produces {}D vectors",
                    self.info.model,
                    self.info.dimension,
                    embedder.model_name(),
                    embedder.dimension()
                ),
            ));
        }

        if embedder.model_name() != self.info.model {
            tracing::warn!(
                "Collection '{}' was built with {}, querying with {}",
                self.info.name,
                self.info.model,
                embedder.model_name()
            );
        }

        self.embedder = Some(embedder);
        Ok(self)
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn info(&self) -> &CollectionInfo {
        &self.info
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn query_vector(&self, query: &Query) -> Result<Vec<f32>, RetrievalError> {
        let vector = match query {
            Query::Vector(vector) => vector.clone(),
            Query::Text(text) => {
                let embedder = self.embedder.as_ref().ok_or_else(|| {
                    RetrievalError::InvalidQuery(format!(
                        "dense collection '{}' needs an embedder for text queries",
                        self.info.name
                    ))
                })?;
                embedder.embed(text)?
            }
        };

        if vector.len() != self.info.dimension {
            return Err(RetrievalError::InvalidQuery(format!(
                "query vector has {} dimensions, collection '{}' has {}",
                vector.len(),
                self.info.name,
                self.info.dimension
            )));
        }

        Ok(vector)
    }

    fn distances(&self, query: &[f32]) -> Vec<f32> {
        let query = ArrayView1::from(query);

        match self.metric {
            DistanceMetric::Cosine => {
                let query_norm = query.dot(&query).sqrt();
                let dots = self.vectors.dot(&query);

                dots.iter()
                    .zip(&self.norms)
                    .map(|(dot, norm)| {
                        let denominator = norm * query_norm;
                        if denominator == 0.0 {
                            1.0
                        } else {
                            1.0 - dot / denominator
                        }
                    })
                    .collect()
            }
            DistanceMetric::L2 => self
                .vectors
                .rows()
                .into_iter()
                .map(|row| {
                    row.iter()
                        .zip(query.iter())
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum::<f32>()
                })
                .collect(),
        }
    }
}

impl Retriever for DenseRetriever {
    fn connect(location: &Path, collection: &str) -> Result<Self, RetrievalError> {
        let store = DenseStore::open(location)
            .map_err(|e| RetrievalError::connection(location, collection, e))?;

        let info = store
            .collection_info(collection)
            .map_err(|e| RetrievalError::connection(location, collection, e))?
            .ok_or_else(|| {
                RetrievalError::connection(location, collection, "collection does not exist")
            })?;

        let records = store
            .load_collection(collection)
            .map_err(|e| RetrievalError::connection(location, collection, e))?;

        let mut document_ids = Vec::with_capacity(records.len());
        let mut documents = Vec::with_capacity(records.len());
        let mut metadatas = Vec::with_capacity(records.len());
        let mut flat = Vec::with_capacity(records.len() * info.dimension);

        for record in records {
            let metadata = decode_metadata(&record.metadata).map_err(|e| {
                RetrievalError::connection(
                    location,
                    collection,
                    format!("bad metadata for {}: {}", record.document_id, e),
                )
            })?;

            flat.extend_from_slice(&record.embedding);
            document_ids.push(record.document_id);
            documents.push(record.document);
            metadatas.push(metadata);
        }

        let vectors = Array2::from_shape_vec((document_ids.len(), info.dimension), flat)
            .map_err(|e| RetrievalError::connection(location, collection, e))?;

        let norms = vectors
            .rows()
            .into_iter()
            .map(|row| row.dot(&row).sqrt())
            .collect();

        tracing::info!(
            "Connected dense collection '{}' ({} documents, {}D, {})",
            collection,
            document_ids.len(),
            info.dimension,
            info.model
        );

        Ok(Self {
            location: location.to_path_buf(),
            info,
            metric: DistanceMetric::default(),
            document_ids,
            documents,
            metadatas,
            vectors,
            norms,
            embedder: None,
        })
    }

    fn rank_all(&self, query: &Query) -> Result<RankingResult, RetrievalError> {
        let vector = self.query_vector(query)?;
        let distances = self.distances(&vector);

        let scored = distances
            .into_iter()
            .enumerate()
            .map(|(row, distance)| ScoredDocument {
                document_id: self.document_ids[row].clone(),
                score: distance,
                document: self.documents[row].clone(),
                metadata: self.metadatas[row].clone(),
            })
            .collect();

        Ok(RankingResult::from_scored(scored, ScoreOrder::Ascending))
    }

    fn corpus_size(&self) -> usize {
        self.document_ids.len()
    }

    fn kind(&self) -> &'static str {
        "dense"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingProvider;
    use crate::storage::DenseRecord;
    use tempfile::TempDir;

    fn build_store(dir: &TempDir, vectors: &[(&str, Vec<f32>)]) -> PathBuf {
        let path = dir.path().join("dense.sqlite");
        let store = DenseStore::open_or_create(&path).unwrap();
        let dimension = vectors.first().map(|(_, v)| v.len()).unwrap_or(3);
        store
            .create_collection("abstracts", "test-model", dimension)
            .unwrap();

        let records: Vec<DenseRecord> = vectors
            .iter()
            .map(|(id, embedding)| DenseRecord {
                document_id: id.to_string(),
                document: format!("text {}", id),
                metadata: format!(r#"{{"title":"{}"}}"#, id),
                embedding: embedding.clone(),
            })
            .collect();
        store.upsert_batch("abstracts", &records).unwrap();
        path
    }

    #[test]
    fn test_cosine_ranking_is_total() {
        let dir = TempDir::new().unwrap();
        let path = build_store(
            &dir,
            &[
                ("a", vec![1.0, 0.0, 0.0]),
                ("b", vec![0.0, 1.0, 0.0]),
                ("c", vec![0.9, 0.1, 0.0]),
            ],
        );

        let retriever = DenseRetriever::connect(&path, "abstracts").unwrap();
        let ranking = retriever
            .rank_all(&Query::Vector(vec![1.0, 0.0, 0.0]))
            .unwrap();

        assert_eq!(ranking.document_ids(), &["a", "c", "b"]);
        assert_eq!(ranking.ranks(), &[1, 2, 3]);
        assert!(ranking.scores()[0].abs() < 1e-6);
        assert!((ranking.scores()[2] - 1.0).abs() < 1e-6);
        assert_eq!(
            ranking.metadatas()[0].get("title").and_then(|v| v.as_str()),
            Some("a")
        );
    }

    #[test]
    fn test_l2_metric() {
        let dir = TempDir::new().unwrap();
        let path = build_store(&dir, &[("far", vec![10.0, 0.0]), ("near", vec![2.0, 0.0])]);

        let retriever = DenseRetriever::connect(&path, "abstracts")
            .unwrap()
            .with_metric(DistanceMetric::L2);
        let ranking = retriever.rank_all(&Query::Vector(vec![1.0, 0.0])).unwrap();

        assert_eq!(ranking.document_ids(), &["near", "far"]);
        assert_eq!(ranking.scores(), &[1.0, 81.0]);
    }

    #[test]
    fn test_zero_vector_distance() {
        let dir = TempDir::new().unwrap();
        let path = build_store(&dir, &[("zero", vec![0.0, 0.0]), ("x", vec![1.0, 0.0])]);

        let retriever = DenseRetriever::connect(&path, "abstracts").unwrap();
        let ranking = retriever.rank_all(&Query::Vector(vec![1.0, 0.0])).unwrap();

        assert_eq!(ranking.document_ids(), &["x", "zero"]);
        assert_eq!(ranking.scores()[1], 1.0);
    }

    #[test]
    fn test_top_k_is_prefix_of_rank_all() {
        let dir = TempDir::new().unwrap();
        let path = build_store(
            &dir,
            &[
                ("a", vec![1.0, 0.0]),
                ("b", vec![0.0, 1.0]),
                ("c", vec![0.7, 0.7]),
            ],
        );

        let retriever = DenseRetriever::connect(&path, "abstracts").unwrap();
        let query = Query::Vector(vec![1.0, 0.2]);
        let ranking = retriever.rank_all(&query).unwrap();
        let top = retriever.top_k(&query, 2).unwrap();

        assert_eq!(top.document_ids, &ranking.document_ids()[..2]);
        assert_eq!(retriever.top_k(&query, 50).unwrap().len(), 3);
    }

    #[test]
    fn test_text_query_needs_embedder() {
        let dir = TempDir::new().unwrap();
        let path = build_store(&dir, &[("a", vec![1.0, 0.0, 0.0])]);

        let retriever = DenseRetriever::connect(&path, "abstracts").unwrap();
        let result = retriever.rank_all(&Query::text("oxygen"));
        assert!(matches!(result, Err(RetrievalError::InvalidQuery(_))));

        let retriever = retriever
            .with_embedder(Arc::new(HashingProvider::new(3).unwrap()))
            .unwrap();
        assert_eq!(retriever.rank_all(&Query::text("oxygen")).unwrap().len(), 1);
    }

    #[test]
    fn test_wrong_vector_dimension() {
        let dir = TempDir::new().unwrap();
        let path = build_store(&dir, &[("a", vec![1.0, 0.0, 0.0])]);

        let retriever = DenseRetriever::connect(&path, "abstracts").unwrap();
        let result = retriever.rank_all(&Query::Vector(vec![1.0]));
        assert!(matches!(result, Err(RetrievalError::InvalidQuery(_))));
    }

    #[test]
    fn test_embedder_dimension_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = build_store(&dir, &[("a", vec![1.0, 0.0, 0.0])]);

        let result = DenseRetriever::connect(&path, "abstracts")
            .unwrap()
            .with_embedder(Arc::new(HashingProvider::new(8).unwrap()));
        assert!(matches!(result, Err(RetrievalError::Connection { .. })));
    }

    #[test]
    fn test_connect_failures() {
        let dir = TempDir::new().unwrap();

        let missing_store = DenseRetriever::connect(&dir.path().join("none.sqlite"), "abstracts");
        assert!(matches!(
            missing_store,
            Err(RetrievalError::Connection { .. })
        ));

        let path = build_store(&dir, &[("a", vec![1.0])]);
        let missing_collection = DenseRetriever::connect(&path, "other");
        match missing_collection {
            Err(RetrievalError::Connection { collection, .. }) => assert_eq!(collection, "other"),
            _ => panic!("expected connection error"),
        }
    }

    #[test]
    fn test_empty_collection() {
        let dir = TempDir::new().unwrap();
        let path = build_store(&dir, &[]);

        let retriever = DenseRetriever::connect(&path, "abstracts").unwrap();
        assert_eq!(retriever.corpus_size(), 0);

        let ranking = retriever
            .rank_all(&Query::Vector(vec![1.0, 0.0, 0.0]))
            .unwrap();
        assert!(ranking.is_empty());
    }
}
