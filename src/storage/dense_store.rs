//! Dense collection storage: documents with their embedding vectors

use super::Database;
use crate::error::{PaperfuseError, Result};
use rusqlite::{params, OptionalExtension};
use std::path::Path;

/// A collection's registration record
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub model: String,
    pub dimension: usize,
    pub created_at: String,
}

/// One stored document of a dense collection
#[derive(Debug, Clone, PartialEq)]
pub struct DenseRecord {
    pub document_id: String,
    pub document: String,
    /// Encoded metadata (JSON object)
    pub metadata: String,
    pub embedding: Vec<f32>,
}

/// SQLite-backed store of dense collections
pub struct DenseStore {
    database: Database,
}

impl DenseStore {
    /// Open or create the store at `db_path`
    pub fn open_or_create(db_path: &Path) -> Result<Self> {
        Ok(Self {
            database: Database::new(db_path)?,
        })
    }

    /// Open an existing store; fails when the file does not exist
    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self {
            database: Database::open_existing(db_path)?,
        })
    }

    /// Register a collection, or check an existing registration is compatible
    pub fn create_collection(&self, name: &str, model: &str, dimension: usize) -> Result<()> {
        if let Some(existing) = self.collection_info(name)? {
            if existing.model != model || existing.dimension != dimension {
                return Err(PaperfuseError::InvalidConfigValue {
                    path: format!("collection '{}'", name),
                    message: format!(
                        "built with {} ({}D), cannot add vectors from {} ({}D)",
                        existing.model, existing.dimension, model, dimension
                    ),
                });
            }
            return Ok(());
        }

        let conn = self.database.get_conn()?;
        conn.execute(
            "INSERT INTO collections (name, model, dimension, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, model, dimension as i64, chrono::Utc::now().to_rfc3339()],
        )?;

        tracing::info!("Created dense collection '{}' ({}, {}D)", name, model, dimension);
        Ok(())
    }

    /// Look up a collection's registration
    pub fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let conn = self.database.get_conn()?;
        let info = conn
            .query_row(
                "SELECT name, model, dimension, created_at FROM collections WHERE name = ?1",
                params![name],
                |row| {
                    Ok(CollectionInfo {
                        name: row.get(0)?,
                        model: row.get(1)?,
                        dimension: row.get::<_, i64>(2)? as usize,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    /// Remove a collection and all of its entries
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        let conn = self.database.get_conn()?;
        conn.execute("DELETE FROM entries WHERE collection = ?1", params![name])?;
        conn.execute("DELETE FROM collections WHERE name = ?1", params![name])?;
        Ok(())
    }

    /// Insert or replace records in one transaction
    pub fn upsert_batch(&self, collection: &str, records: &[DenseRecord]) -> Result<()> {
        let info = self.collection_info(collection)?.ok_or_else(|| {
            PaperfuseError::Config(format!("Dense collection '{}' is not registered", collection))
        })?;

        let mut conn = self.database.get_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO entries (collection, document_id, document, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for record in records {
                if record.embedding.len() != info.dimension {
                    return Err(PaperfuseError::InvalidConfigValue {
                        path: format!("collection '{}'", collection),
                        message: format!(
                            "document {} has a {}D embedding, expected {}D",
                            record.document_id,
                            record.embedding.len(),
                            info.dimension
                        ),
                    });
                }

                stmt.execute(params![
                    collection,
                    record.document_id,
                    record.document,
                    record.metadata,
                    encode_vector(&record.embedding),
                ])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    /// Load every record of a collection, ordered by document id
    pub fn load_collection(&self, collection: &str) -> Result<Vec<DenseRecord>> {
        let conn = self.database.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT document_id, document, metadata, embedding FROM entries
             WHERE collection = ?1 ORDER BY document_id",
        )?;

        let rows = stmt.query_map(params![collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (document_id, document, metadata, blob) = row?;
            let embedding = decode_vector(&blob).ok_or_else(|| {
                PaperfuseError::Config(format!(
                    "Corrupt embedding for document {} ({} bytes)",
                    document_id,
                    blob.len()
                ))
            })?;

            records.push(DenseRecord {
                document_id,
                document,
                metadata,
                embedding,
            });
        }

        Ok(records)
    }

    /// Number of records in a collection
    pub fn count(&self, collection: &str) -> Result<usize> {
        let conn = self.database.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// Little-endian f32 encoding
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }

    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}
