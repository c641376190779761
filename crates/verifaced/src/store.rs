use std::future::Future;
use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_rusqlite::Connection;
use veriface_core::matcher::{validate_vector, MatchError};
use veriface_core::StoredVectorRecord;

const F64_LEN: usize = std::mem::size_of::<f64>();

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("vector store unavailable")]
    Unavailable,
    #[error("invalid vector: {0}")]
    InvalidVector(#[from] MatchError),
}

/// A descriptor the driver asks the store to enroll.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVectorRecord {
    pub vector: Vec<f64>,
    pub timestamp: DateTime<Utc>,
    pub wallet_address: Option<String>,
}

/// Append/query store of enrolled descriptors.
///
/// The core treats the store as append-only: it reads full snapshots for
/// the duplicate check and appends one record per successful session.
pub trait VectorStore: Send + Sync {
    /// Persist a record, returning the id the store assigned to it.
    fn append(
        &self,
        record: NewVectorRecord,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;

    /// Snapshot of every stored record, in insertion order.
    fn query_all(&self) -> impl Future<Output = Result<Vec<StoredVectorRecord>, StoreError>> + Send;
}

/// Store used when no backend is configured: queries see nothing and
/// appends report [`StoreError::Unavailable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl VectorStore for NullStore {
    async fn append(&self, _record: NewVectorRecord) -> Result<String, StoreError> {
        Err(StoreError::Unavailable)
    }

    async fn query_all(&self) -> Result<Vec<StoredVectorRecord>, StoreError> {
        tracing::debug!("vector store disabled; duplicate check sees no records");
        Ok(Vec::new())
    }
}

/// SQLite-backed vector store.
///
/// Vectors are stored as little-endian `f64` blobs. Values are validated on
/// insert but not on read: rows written by older versions may hold anything,
/// and filtering them is the matcher's job.
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Connection,
}

impl SqliteVectorStore {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 CREATE TABLE IF NOT EXISTS vectors (
                     id TEXT PRIMARY KEY,
                     vector BLOB NOT NULL,
                     wallet_address TEXT,
                     created_at TEXT NOT NULL
                 );",
            )?;
            Ok(())
        })
        .await?;

        tracing::debug!(path = %db_path.display(), "vector store opened");
        Ok(Self { conn })
    }

    /// Insert a record. Returns the generated UUID.
    pub async fn insert(&self, record: &NewVectorRecord) -> Result<String, StoreError> {
        validate_vector(&record.vector)?;

        let id = uuid::Uuid::new_v4().to_string();
        let blob = vector_to_bytes(&record.vector);
        let created_at = record.timestamp.to_rfc3339();
        let wallet_address = record.wallet_address.clone();
        let id_clone = id.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO vectors (id, vector, wallet_address, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![id_clone, blob, wallet_address, created_at],
                )?;
                Ok(())
            })
            .await?;

        Ok(id)
    }

    /// Every stored record, oldest first. Rows whose blob cannot be split
    /// into `f64` values are logged and dropped.
    pub async fn all_records(&self) -> Result<Vec<StoredVectorRecord>, StoreError> {
        let rows: Vec<(String, Vec<u8>, Option<String>, String)> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, vector, wallet_address, created_at
                     FROM vectors ORDER BY rowid",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, blob, wallet_address, timestamp) in rows {
            let Some(vector) = bytes_to_vector(&blob) else {
                tracing::warn!(record_id = %id, bytes = blob.len(), "dropping row with malformed vector blob");
                continue;
            };
            records.push(StoredVectorRecord {
                id,
                vector,
                timestamp,
                wallet_address,
            });
        }
        Ok(records)
    }

    /// List stored records (metadata only, no vectors).
    pub async fn list(&self) -> Result<Vec<RecordInfo>, StoreError> {
        self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, length(vector), wallet_address, created_at
                     FROM vectors ORDER BY rowid",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(RecordInfo {
                        id: row.get(0)?,
                        dimensions: row.get::<_, i64>(1)? as usize / F64_LEN,
                        wallet_address: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(StoreError::from)
    }

    /// Count stored records.
    pub async fn count_all(&self) -> Result<u64, StoreError> {
        self.conn
            .call(|conn| {
                let count: u64 =
                    conn.query_row("SELECT COUNT(*) FROM vectors", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
            .map_err(StoreError::from)
    }
}

impl VectorStore for SqliteVectorStore {
    async fn append(&self, record: NewVectorRecord) -> Result<String, StoreError> {
        self.insert(&record).await
    }

    async fn query_all(&self) -> Result<Vec<StoredVectorRecord>, StoreError> {
        self.all_records().await
    }
}

// ── Serialization helpers ─────────────────────────────────────────────────────

fn vector_to_bytes(values: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * F64_LEN);
    for &v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn bytes_to_vector(bytes: &[u8]) -> Option<Vec<f64>> {
    if bytes.len() % F64_LEN != 0 {
        return None;
    }
    bytes
        .chunks_exact(F64_LEN)
        .map(|chunk| chunk.try_into().ok().map(f64::from_le_bytes))
        .collect()
}

// ── Public types ──────────────────────────────────────────────────────────────

/// Metadata about a stored record (no vector data).
#[derive(Debug, Clone, serde::Serialize)]
pub struct RecordInfo {
    pub id: String,
    pub dimensions: usize,
    pub wallet_address: Option<String>,
    pub created_at: String,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
