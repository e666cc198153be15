//! SQLite-backed vector index.
//!
//! Passages and their metadata live in one table with the embedding as a
//! little-endian f32 blob; search is brute-force cosine over all rows.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{IndexEntry, IndexHit, VectorIndex};
use crate::core::errors::ApiError;
use crate::corpus::Passage;
use crate::vector_math::rank_descending_by_cosine;

pub struct SqliteIndex {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteIndex {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let index = Self { pool, db_path };
        index.init_schema().await?;
        Ok(index)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS passages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                document TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn add(&self, entries: Vec<IndexEntry>) -> Result<usize, ApiError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        let mut added = 0;

        for entry in &entries {
            let blob = Self::serialize_embedding(&entry.embedding);
            let metadata = serde_json::to_string(&entry.metadata).map_err(ApiError::internal)?;

            let result = sqlx::query(
                "INSERT OR IGNORE INTO passages (id, document, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&entry.id)
            .bind(&entry.document)
            .bind(&metadata)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
            added += result.rows_affected() as usize;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(added)
    }

    async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passages")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count.max(0) as usize)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>, ApiError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query("SELECT id, document, metadata, embedding FROM passages ORDER BY seq")
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        let embeddings: Vec<Vec<f32>> = rows
            .iter()
            .map(|row| {
                let bytes: Vec<u8> = row.get("embedding");
                Self::deserialize_embedding(&bytes)
            })
            .collect();
        let candidates: Vec<&[f32]> = embeddings.iter().map(|e| e.as_slice()).collect();
        let ranked = rank_descending_by_cosine(vector, &candidates)?;

        let mut hits = Vec::with_capacity(top_k.min(ranked.len()));
        for (idx, score) in ranked.into_iter().take(top_k) {
            let row = &rows[idx];
            let metadata_str: String = row.get("metadata");
            let metadata: Passage = serde_json::from_str(&metadata_str).map_err(|e| {
                ApiError::Internal(format!("stored metadata is unreadable: {}", e))
            })?;
            hits.push(IndexHit {
                id: row.get("id"),
                document: row.get("document"),
                metadata,
                score,
            });
        }
        Ok(hits)
    }

    async fn clear(&self) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM passages")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>, ApiError> {
        sqlx::query_scalar::<_, String>("SELECT value FROM index_meta WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }
}
