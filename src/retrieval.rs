//! Retrieval stage: query text → ranked snippets.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::embedding::{embed_query, Embedder};
use crate::error::RagError;
use crate::index::VectorIndex;
use crate::models::{RetrievalRequest, SearchResult};

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    index_name: String,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            index_name: index_name.into(),
        }
    }

    /// Top-`limit` snippets for `request.query`, best first.
    ///
    /// A missing, empty or unreachable index yields an empty result, not
    /// an error. Invalid requests, a query embedder that does not match
    /// the index's model, and embedding failures are errors.
    pub async fn search(&self, request: &RetrievalRequest) -> Result<SearchResult> {
        request.validate()?;

        let spec = match self.index.describe(&self.index_name).await {
            Ok(Some(spec)) => spec,
            Ok(None) => {
                tracing::debug!(index = %self.index_name, "index does not exist yet");
                return Ok(SearchResult::default());
            }
            Err(e) => {
                tracing::warn!(index = %self.index_name, error = %e, "index unreachable");
                return Ok(SearchResult::default());
            }
        };

        if !spec.model.is_empty() && spec.model != self.embedder.model_name() {
            return Err(RagError::ModelMismatch {
                index: spec.name,
                indexed: spec.model,
                query: self.embedder.model_name().to_string(),
            }
            .into());
        }

        let vector = embed_query(self.embedder.as_ref(), &request.query)
            .await
            .context("Failed to embed query")?;

        let matches = match self
            .index
            .search(&self.index_name, &vector, request.limit)
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(index = %self.index_name, error = %e, "search failed");
                return Ok(SearchResult::default());
            }
        };

        tracing::info!(hits = matches.len(), limit = request.limit, "retrieved");

        Ok(SearchResult {
            snippets: matches.into_iter().map(|m| m.text).collect(),
        })
    }
}
