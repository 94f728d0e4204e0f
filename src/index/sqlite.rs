//! SQLite-backed [`VectorIndex`].
//!
//! Vectors are stored as little-endian `f32` BLOBs next to their chunk
//! metadata. Search loads every vector of the collection and ranks by
//! cosine similarity in process, which is fine for product-doc sized
//! corpora.
//!
//! Schema:
//!
//! | Table | Contents |
//! |-------|----------|
//! | `indexes` | one row per collection: name, dims, model |
//! | `index_entries` | id, source, chunk_index, text, embedding BLOB |
//! | `index_sources` | per-source chunk count and last ingestion run |

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::RagError;
use crate::models::IndexEntry;

use super::{rank, IndexMatch, IndexSpec, SourceRecord, VectorIndex};

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open (creating if needed) the database named by a `sqlite:<path>` URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let path = url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create index directory: {}", parent.display())
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open vector store at {}", path))?;

        let index = Self { pool };
        index.ensure_schema().await?;
        Ok(index)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS indexes (
                name TEXT PRIMARY KEY,
                dims INTEGER NOT NULL,
                model TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_entries (
                index_name TEXT NOT NULL,
                id TEXT NOT NULL,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                PRIMARY KEY (index_name, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_index_entries_source ON index_entries(index_name, source)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_sources (
                index_name TEXT NOT NULL,
                source TEXT NOT NULL,
                chunk_count INTEGER NOT NULL,
                run_id TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (index_name, source)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn require_dims(&self, name: &str) -> Result<usize> {
        let row = sqlx::query("SELECT dims FROM indexes WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(row.get::<i64, _>("dims") as usize),
            None => Err(RagError::IndexNotFound(name.to_string()).into()),
        }
    }
}

fn check_dims(name: &str, dims: usize, entries: &[IndexEntry]) -> Result<()> {
    if let Some(bad) = entries.iter().find(|e| e.vector.len() != dims) {
        return Err(RagError::DimensionMismatch {
            index: name.to_string(),
            expected: dims,
            actual: bad.vector.len(),
        }
        .into());
    }
    Ok(())
}

async fn insert_entries(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
    entries: &[IndexEntry],
) -> Result<()> {
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO index_entries (index_name, id, source, chunk_index, text, embedding)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(index_name, id) DO UPDATE SET
                source = excluded.source,
                chunk_index = excluded.chunk_index,
                text = excluded.text,
                embedding = excluded.embedding
            "#,
        )
        .bind(name)
        .bind(&entry.id)
        .bind(&entry.metadata.source)
        .bind(entry.metadata.chunk_index as i64)
        .bind(&entry.metadata.text)
        .bind(vec_to_blob(&entry.vector))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        if let Some(existing) = self.describe(&spec.name).await? {
            existing.check_compatible(spec)?;
            return Ok(());
        }

        sqlx::query(
            "INSERT OR IGNORE INTO indexes (name, dims, model, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&spec.name)
        .bind(spec.dims as i64)
        .bind(&spec.model)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn describe(&self, name: &str) -> Result<Option<IndexSpec>> {
        let row = sqlx::query("SELECT name, dims, model FROM indexes WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| IndexSpec {
            name: row.get("name"),
            dims: row.get::<i64, _>("dims") as usize,
            model: row.get("model"),
        }))
    }

    async fn upsert(&self, name: &str, entries: &[IndexEntry]) -> Result<()> {
        let dims = self.require_dims(name).await?;
        check_dims(name, dims, entries)?;

        let mut tx = self.pool.begin().await?;
        insert_entries(&mut tx, name, entries).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_by_source(&self, name: &str, source: &str) -> Result<u64> {
        self.require_dims(name).await?;

        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM index_entries WHERE index_name = ? AND source = ?")
            .bind(name)
            .bind(source)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM index_sources WHERE index_name = ? AND source = ?")
            .bind(name)
            .bind(source)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(removed)
    }

    async fn replace_source(
        &self,
        name: &str,
        source: &str,
        entries: &[IndexEntry],
        run_id: &str,
    ) -> Result<()> {
        let dims = self.require_dims(name).await?;
        check_dims(name, dims, entries)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM index_entries WHERE index_name = ? AND source = ?")
            .bind(name)
            .bind(source)
            .execute(&mut *tx)
            .await?;

        insert_entries(&mut tx, name, entries).await?;

        sqlx::query(
            r#"
            INSERT INTO index_sources (index_name, source, chunk_count, run_id, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(index_name, source) DO UPDATE SET
                chunk_count = excluded.chunk_count,
                run_id = excluded.run_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(source)
        .bind(entries.len() as i64)
        .bind(run_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, name: &str, query: &[f32], k: usize) -> Result<Vec<IndexMatch>> {
        let rows = sqlx::query(
            "SELECT id, source, chunk_index, text, embedding FROM index_entries WHERE index_name = ?",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        let matches = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                IndexMatch {
                    id: row.get("id"),
                    score: cosine_similarity(query, &blob_to_vec(&blob)),
                    source: row.get("source"),
                    chunk_index: row.get::<i64, _>("chunk_index") as usize,
                    text: row.get("text"),
                }
            })
            .collect();

        Ok(rank(matches, k))
    }

    async fn sources(&self, name: &str) -> Result<Vec<SourceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT source, chunk_count, run_id, updated_at
            FROM index_sources
            WHERE index_name = ?
            ORDER BY source
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| SourceRecord {
                source: row.get("source"),
                chunk_count: row.get::<i64, _>("chunk_count") as usize,
                run_id: row.get("run_id"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
