//! In-memory [`VectorIndex`] for tests and throwaway runs.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Search is
//! brute-force cosine similarity over every stored vector.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::RagError;
use crate::models::IndexEntry;

use super::{rank, IndexMatch, IndexSpec, SourceRecord, VectorIndex};

struct Collection {
    spec: IndexSpec,
    entries: HashMap<String, IndexEntry>,
    sources: HashMap<String, SourceRecord>,
}

impl Collection {
    fn check_dims(&self, entries: &[IndexEntry]) -> Result<()> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != self.spec.dims) {
            return Err(RagError::DimensionMismatch {
                index: self.spec.name.clone(),
                expected: self.spec.dims,
                actual: bad.vector.len(),
            }
            .into());
        }
        Ok(())
    }

    fn remove_source(&mut self, source: &str) -> u64 {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.metadata.source != source);
        (before - self.entries.len()) as u64
    }

    fn insert(&mut self, entries: &[IndexEntry]) {
        for entry in entries {
            self.entries.insert(entry.id.clone(), entry.clone());
        }
    }
}

/// In-memory vector index.
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of entries stored in `name` (0 for an unknown collection).
    pub fn len(&self, name: &str) -> usize {
        self.read()
            .map(|c| c.get(name).map(|col| col.entries.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, name: &str) -> bool {
        self.len(name) == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Collection>>> {
        self.collections
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(name: &str) -> anyhow::Error {
    RagError::IndexNotFound(name.to_string()).into()
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut collections = self.write()?;
        if let Some(existing) = collections.get(&spec.name) {
            existing.spec.check_compatible(spec)?;
            return Ok(());
        }
        collections.insert(
            spec.name.clone(),
            Collection {
                spec: spec.clone(),
                entries: HashMap::new(),
                sources: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn describe(&self, name: &str) -> Result<Option<IndexSpec>> {
        Ok(self.read()?.get(name).map(|c| c.spec.clone()))
    }

    async fn upsert(&self, name: &str, entries: &[IndexEntry]) -> Result<()> {
        let mut collections = self.write()?;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;
        collection.check_dims(entries)?;
        collection.insert(entries);
        Ok(())
    }

    async fn delete_by_source(&self, name: &str, source: &str) -> Result<u64> {
        let mut collections = self.write()?;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;
        collection.sources.remove(source);
        Ok(collection.remove_source(source))
    }

    async fn replace_source(
        &self,
        name: &str,
        source: &str,
        entries: &[IndexEntry],
        run_id: &str,
    ) -> Result<()> {
        let mut collections = self.write()?;
        let collection = collections.get_mut(name).ok_or_else(|| missing(name))?;
        collection.check_dims(entries)?;
        collection.remove_source(source);
        collection.insert(entries);
        collection.sources.insert(
            source.to_string(),
            SourceRecord {
                source: source.to_string(),
                chunk_count: entries.len(),
                run_id: run_id.to_string(),
                updated_at: chrono::Utc::now().timestamp(),
            },
        );
        Ok(())
    }

    async fn search(&self, name: &str, query: &[f32], k: usize) -> Result<Vec<IndexMatch>> {
        let collections = self.read()?;
        let collection = match collections.get(name) {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        let matches = collection
            .entries
            .values()
            .map(|e| IndexMatch {
                id: e.id.clone(),
                score: cosine_similarity(query, &e.vector),
                source: e.metadata.source.clone(),
                chunk_index: e.metadata.chunk_index,
                text: e.metadata.text.clone(),
            })
            .collect();

        Ok(rank(matches, k))
    }

    async fn sources(&self, name: &str) -> Result<Vec<SourceRecord>> {
        let collections = self.read()?;
        let mut records: Vec<SourceRecord> = collections
            .get(name)
            .map(|c| c.sources.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(records)
    }
}
