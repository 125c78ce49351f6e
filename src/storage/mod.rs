//! Storage layer for paperfuse
//!
//! Each retrieval strategy owns its own persisted representation of the
//! corpus: the dense store keeps embedding vectors in SQLite, the keyword
//! index keeps preprocessed tokens in tantivy. Both keep the raw document and
//! its metadata so they can answer queries on their own.

pub mod database;
pub mod dense_store;
pub mod keyword_index;

pub use database::{Database, DbPool};
pub use dense_store::{CollectionInfo, DenseRecord, DenseStore};
pub use keyword_index::{KeywordHit, KeywordIndex, KeywordIndexError};

use crate::error::{PaperfuseError, Result};
use std::path::{Path, PathBuf};

/// On-disk layout of a data directory
///
/// ```text
/// <data_dir>/
///   dense.sqlite            dense collections
///   sparse/<collection>/    one tantivy index per sparse collection
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    base_path: PathBuf,
}

impl StorageLayout {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Create the directory structure
    pub fn ensure(&self) -> Result<()> {
        let sparse_root = self.sparse_root();
        std::fs::create_dir_all(&sparse_root).map_err(|e| PaperfuseError::Io {
            source: e,
            context: format!("Failed to create sparse directory: {}", sparse_root.display()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn dense_db_path(&self) -> PathBuf {
        self.base_path.join("dense.sqlite")
    }

    pub fn sparse_root(&self) -> PathBuf {
        self.base_path.join("sparse")
    }

    pub fn sparse_collection_dir(&self, collection: &str) -> PathBuf {
        self.sparse_root().join(collection)
    }
}
