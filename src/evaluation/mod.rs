//! Offline evaluation of strategies against known relevant documents
//!
//! For each (query, document_id) pair the target's 1-based position is
//! recorded for every single strategy and for the fused ranking, over the
//! whole corpus. Positions are aggregated into mean position, mean
//! reciprocal rank and hit rate per method.

use crate::error::{PaperfuseError, Result};
use crate::retrieval::{CompositeRetriever, RetrievalError};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Method name used for the fused ranking
pub const FUSED_METHOD: &str = "fused";

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("Evaluation task failed: {0}")]
    Task(String),
}

/// One evaluation row: a query and the document it should find
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EvalQuery {
    pub query: String,
    pub document_id: String,
}

impl EvalQuery {
    pub fn new(query: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            document_id: document_id.into(),
        }
    }
}

/// Read a JSONL file of `{"query": .., "document_id": ..}` rows
pub fn read_queries(path: &Path) -> Result<Vec<EvalQuery>> {
    let file = std::fs::File::open(path).map_err(|e| PaperfuseError::Io {
        source: e,
        context: format!("Failed to open queries file: {:?}", path),
    })?;

    let mut queries = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| PaperfuseError::Io {
            source: e,
            context: format!("Failed to read line {} of {:?}", line_no + 1, path),
        })?;

        if line.trim().is_empty() {
            continue;
        }

        let query: EvalQuery = serde_json::from_str(&line).map_err(|e| PaperfuseError::Json {
            source: e,
            context: format!("Invalid query row at line {}", line_no + 1),
        })?;

        if query.query.trim().is_empty() {
            return Err(PaperfuseError::Config(format!(
                "Empty query at line {} of {:?}",
                line_no + 1,
                path
            )));
        }

        queries.push(query);
    }

    Ok(queries)
}

/// Position of the target under one method; `None` when it was not ranked
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodPosition {
    pub method: String,
    pub position: Option<usize>,
}

/// Per-query result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub query: String,
    pub document_id: String,
    /// Strategies in configured order, then the fused ranking
    pub positions: Vec<MethodPosition>,
}

impl QueryOutcome {
    pub fn position(&self, method: &str) -> Option<usize> {
        self.positions
            .iter()
            .find(|p| p.method == method)
            .and_then(|p| p.position)
    }
}

/// Aggregate over all queries for one method
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodSummary {
    pub method: String,
    pub evaluated: usize,
    /// Queries whose target was absent from the ranking
    pub missing: usize,
    /// Mean position over queries where the target was found
    pub mean_position: Option<f64>,
    /// Mean reciprocal rank; missing targets count as 0
    pub mrr: f64,
    /// Share of queries with the target at or above the cutoff
    pub hit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub hit_cutoff: usize,
    pub methods: Vec<MethodSummary>,
    pub outcomes: Vec<QueryOutcome>,
    pub duration_ms: u64,
}

/// Aggregate outcomes per method, in the order given
pub fn summarize(
    outcomes: &[QueryOutcome],
    methods: &[String],
    hit_cutoff: usize,
) -> Vec<MethodSummary> {
    methods
        .iter()
        .map(|method| {
            let positions: Vec<Option<usize>> =
                outcomes.iter().map(|o| o.position(method)).collect();

            let evaluated = positions.len();
            let found: Vec<usize> = positions.iter().flatten().copied().collect();
            let missing = evaluated - found.len();

            let mean_position = if found.is_empty() {
                None
            } else {
                Some(found.iter().sum::<usize>() as f64 / found.len() as f64)
            };

            let (mrr, hit_rate) = if evaluated == 0 {
                (0.0, 0.0)
            } else {
                let reciprocal: f64 = found.iter().map(|&p| 1.0 / p as f64).sum();
                let hits = found.iter().filter(|&&p| p <= hit_cutoff).count();
                (
                    reciprocal / evaluated as f64,
                    hits as f64 / evaluated as f64,
                )
            };

            MethodSummary {
                method: method.clone(),
                evaluated,
                missing,
                mean_position,
                mrr,
                hit_rate,
            }
        })
        .collect()
}

fn evaluate_query(
    retriever: &CompositeRetriever,
    query: &EvalQuery,
) -> std::result::Result<QueryOutcome, RetrievalError> {
    let ranking = retriever.rank(&query.query)?;

    let mut positions: Vec<MethodPosition> = ranking
        .strategies
        .iter()
        .map(|(name, result)| MethodPosition {
            method: name.clone(),
            position: result.rank_of(&query.document_id),
        })
        .collect();

    positions.push(MethodPosition {
        method: FUSED_METHOD.to_string(),
        position: ranking.fused_position(&query.document_id),
    });

    debug!("Evaluated '{}' for {}", query.query, query.document_id);

    Ok(QueryOutcome {
        query: query.query.clone(),
        document_id: query.document_id.clone(),
        positions,
    })
}

/// Runs evaluation queries against a shared composite retriever
pub struct Evaluator {
    retriever: Arc<CompositeRetriever>,
    max_concurrent: usize,
    hit_cutoff: usize,
}

impl Evaluator {
    pub fn new(retriever: Arc<CompositeRetriever>) -> Self {
        Self {
            retriever,
            max_concurrent: 4,
            hit_cutoff: 10,
        }
    }

    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn hit_cutoff(mut self, hit_cutoff: usize) -> Self {
        self.hit_cutoff = hit_cutoff.max(1);
        self
    }

    /// Strategy names followed by the fused method
    pub fn methods(&self) -> Vec<String> {
        self.retriever
            .strategies()
            .iter()
            .map(|s| s.name().to_string())
            .chain(std::iter::once(FUSED_METHOD.to_string()))
            .collect()
    }

    /// Evaluate a single query on the calling thread
    pub fn evaluate_one(
        &self,
        query: &EvalQuery,
    ) -> std::result::Result<QueryOutcome, EvaluationError> {
        Ok(evaluate_query(&self.retriever, query)?)
    }

    /// Evaluate all queries, at most `max_concurrent` at a time
    ///
    /// Outcomes keep the input order. If any query fails, the first failure
    /// in input order is returned once every query has finished.
    pub async fn evaluate(
        &self,
        queries: Vec<EvalQuery>,
    ) -> std::result::Result<EvaluationReport, EvaluationError> {
        let start = Instant::now();
        info!(
            "Evaluating {} queries ({} concurrent)",
            queries.len(),
            self.max_concurrent
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(queries.len());

        for query in queries {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| EvaluationError::Task(e.to_string()))?;
            let retriever = Arc::clone(&self.retriever);

            handles.push(tokio::task::spawn_blocking(move || {
                let outcome = evaluate_query(&retriever, &query);
                drop(permit);
                outcome
            }));
        }

        // Every task is awaited before any failure is reported
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(outcome) => outcome.map_err(EvaluationError::from),
                Err(e) => Err(EvaluationError::Task(e.to_string())),
            });
        }

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!("{} of {} evaluation queries failed", failed, results.len());
        }
        let outcomes = results
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let methods = summarize(&outcomes, &self.methods(), self.hit_cutoff);
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("Evaluation complete: {} queries, {}ms", outcomes.len(), duration_ms);

        Ok(EvaluationReport {
            hit_cutoff: self.hit_cutoff,
            methods,
            outcomes,
            duration_ms,
        })
    }
}
