//! paperfuse - hybrid retrieval over research-paper abstracts
//!
//! A corpus is indexed twice: as embedding vectors in a dense store and as
//! BM25-normalized tokens in a keyword index. Each retrieval strategy ranks
//! the entire corpus for a query, and the composite retriever merges those
//! rankings with Reciprocal Rank Fusion.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod indexing;
pub mod pipeline;
pub mod preprocess;
pub mod retrieval;
pub mod storage;

pub use error::{PaperfuseError, Result};
