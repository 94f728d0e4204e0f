//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the capability the pipeline consumes:
//! named collections of [`IndexEntry`] rows supporting upsert by id,
//! delete by source, and nearest-neighbour search. Backends:
//!
//! | URL | Backend |
//! |-----|---------|
//! | `sqlite:<path>` | [`SqliteIndex`]: sqlx SQLite, WAL, brute-force cosine |
//! | `memory:` | [`InMemoryIndex`]: process-local, for tests and one-off runs |
//!
//! Implementations must support concurrent readers and serialize writes
//! internally.

pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::models::IndexEntry;
use crate::error::RagError;

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

/// Creation parameters of a named collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    pub name: String,
    pub dims: usize,
    /// Embedding model the collection is built with.
    pub model: String,
}

impl IndexSpec {
    /// Check that `requested` can write into this existing collection.
    ///
    /// Dimensions must agree, and so must the model unless none was recorded.
    pub fn check_compatible(&self, requested: &IndexSpec) -> Result<(), RagError> {
        if self.dims != requested.dims {
            return Err(RagError::DimensionMismatch {
                index: self.name.clone(),
                expected: self.dims,
                actual: requested.dims,
            });
        }
        if !self.model.is_empty() && self.model != requested.model {
            return Err(RagError::ModelMismatch {
                index: self.name.clone(),
                indexed: self.model.clone(),
                query: requested.model.clone(),
            });
        }
        Ok(())
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub id: String,
    pub score: f32,
    pub source: String,
    pub chunk_index: usize,
    pub text: String,
}

/// Book-keeping written for each source on every replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRecord {
    pub source: String,
    pub chunk_count: usize,
    /// Ingestion run that last wrote this source.
    pub run_id: String,
    /// Unix timestamp of the last replace.
    pub updated_at: i64,
}

/// Abstract vector index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`create_index`](VectorIndex::create_index) | Create a collection (idempotent) |
/// | [`describe`](VectorIndex::describe) | Read back a collection definition |
/// | [`upsert`](VectorIndex::upsert) | Insert or overwrite entries by id |
/// | [`delete_by_source`](VectorIndex::delete_by_source) | Remove all entries of a source |
/// | [`replace_source`](VectorIndex::replace_source) | Delete-then-upsert one source |
/// | [`search`](VectorIndex::search) | Top-k by cosine similarity |
/// | [`sources`](VectorIndex::sources) | List per-source records |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection. Creating an existing collection with the
    /// same dimensionality is a no-op; a different dimensionality is an error.
    async fn create_index(&self, spec: &IndexSpec) -> Result<()>;

    async fn describe(&self, name: &str) -> Result<Option<IndexSpec>>;

    async fn upsert(&self, name: &str, entries: &[IndexEntry]) -> Result<()>;

    /// Returns the number of entries removed.
    async fn delete_by_source(&self, name: &str, source: &str) -> Result<u64>;

    /// Replace every entry of `source` with `entries` and record the run.
    ///
    /// Backends with transactions override this to make the delete and
    /// the upsert a single atomic step.
    async fn replace_source(
        &self,
        name: &str,
        source: &str,
        entries: &[IndexEntry],
        run_id: &str,
    ) -> Result<()>;

    async fn search(&self, name: &str, query: &[f32], k: usize) -> Result<Vec<IndexMatch>>;

    async fn sources(&self, name: &str) -> Result<Vec<SourceRecord>>;

    /// Release backend resources. Called once at shutdown.
    async fn close(&self) {}
}

/// Open the backend named by a connection URL.
pub async fn connect(url: &str) -> Result<Arc<dyn VectorIndex>> {
    if url.starts_with("memory:") {
        return Ok(Arc::new(InMemoryIndex::new()));
    }
    if url.starts_with("sqlite:") {
        return Ok(Arc::new(SqliteIndex::connect(url).await?));
    }
    bail!(
        "Unsupported vector store URL '{}': expected sqlite:<path> or memory:",
        url
    )
}

/// Sort matches best-first and keep the top `k`.
pub(crate) fn rank(mut matches: Vec<IndexMatch>, k: usize) -> Vec<IndexMatch> {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    matches.truncate(k);
    matches
}
