//! SQLite database management with migrations
//!
//! Backs the dense collections: one row per document with its raw text,
//! encoded metadata and embedding vector.

use crate::error::{PaperfuseError, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open or create a database file, applying pending migrations
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PaperfuseError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let db = Self::with_manager(SqliteConnectionManager::file(db_path))?;
        db.migrate()?;

        Ok(db)
    }

    /// Open an existing database file without creating it
    pub fn open_existing(db_path: &Path) -> Result<Self> {
        if !db_path.is_file() {
            return Err(PaperfuseError::Io {
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                context: format!("Database not found: {:?}", db_path),
            });
        }

        let db = Self::with_manager(SqliteConnectionManager::file(db_path))?;
        db.migrate()?;

        Ok(db)
    }

    fn with_manager(manager: SqliteConnectionManager) -> Result<Self> {
        // Per-connection pragmas; journal mode is persisted in the file
        let manager = manager.with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| {
                PaperfuseError::Config(format!("Failed to create connection pool: {}", e))
            })?;

        {
            let conn = pool
                .get()
                .map_err(|e| PaperfuseError::Config(format!("Failed to get connection: {}", e)))?;

            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                ",
            )?;
        }

        Ok(Self { pool })
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| PaperfuseError::Config(format!("Failed to get connection: {}", e)))
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: dense collections
    r#"
    CREATE TABLE collections (
        name TEXT PRIMARY KEY,
        model TEXT NOT NULL,
        dimension INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE entries (
        collection TEXT NOT NULL,
        document_id TEXT NOT NULL,
        document TEXT NOT NULL,
        metadata TEXT NOT NULL,
        embedding BLOB NOT NULL,
        PRIMARY KEY (collection, document_id),
        FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
    );
    "#,
];
