//! Ingestion pipeline: chunk → embed → replace.
//!
//! [`Ingestor::ingest`] handles one document. Each document is a single
//! unit: its chunks are embedded in one batch and written with one
//! [`VectorIndex::replace_source`] call, so a failed embed never leaves a
//! partial or mismatched set of entries behind.
//!
//! [`ingest_dir`] walks the configured docs directory and ingests every
//! matching file sequentially.

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk::{chunk_id, chunk_text};
use crate::config::Config;
use crate::embedding::{check_batch, Embedder};
use crate::index::{IndexSpec, VectorIndex};
use crate::models::{Document, EntryMetadata, IndexEntry};

/// Result of ingesting one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub chunk_count: usize,
}

/// Per-document ingestion over an explicitly supplied embedder and index.
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    index_name: String,
    max_tokens: usize,
    created: OnceCell<()>,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        index_name: impl Into<String>,
        max_tokens: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            index_name: index_name.into(),
            max_tokens,
            created: OnceCell::new(),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Create the collection on first use. Later calls are free.
    pub async fn ensure_index(&self) -> Result<()> {
        self.created
            .get_or_try_init(|| async {
                let spec = IndexSpec {
                    name: self.index_name.clone(),
                    dims: self.embedder.dims(),
                    model: self.embedder.model_name().to_string(),
                };
                self.index
                    .create_index(&spec)
                    .await
                    .with_context(|| format!("Failed to create index {}", self.index_name))
            })
            .await?;
        Ok(())
    }

    /// Ingest one document, replacing whatever was stored for its source.
    ///
    /// Text that chunks to nothing is a no-op: neither the embedder nor
    /// the index is called and the report carries `chunk_count: 0`.
    pub async fn ingest(&self, document: &Document) -> Result<IngestReport> {
        let chunks = chunk_text(&document.source_id, &document.raw_text, self.max_tokens);
        if chunks.is_empty() {
            tracing::debug!(source = %document.source_id, "no chunks, skipping");
            return Ok(IngestReport { chunk_count: 0 });
        }

        self.ensure_index().await?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed(&texts)
            .await
            .with_context(|| format!("Embedding failed for {}", document.source_id))?;
        check_batch(&vectors, texts.len(), self.embedder.dims())?;

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry {
                id: chunk_id(&chunk.source_id, chunk.index),
                vector,
                metadata: EntryMetadata {
                    text: chunk.text,
                    source: chunk.source_id,
                    chunk_index: chunk.index,
                },
            })
            .collect();

        let run_id = Uuid::new_v4().to_string();
        self.index
            .replace_source(&self.index_name, &document.source_id, &entries, &run_id)
            .await
            .with_context(|| format!("Index write failed for {}", document.source_id))?;

        tracing::info!(
            source = %document.source_id,
            chunks = entries.len(),
            run_id = %run_id,
            "ingested"
        );

        Ok(IngestReport {
            chunk_count: entries.len(),
        })
    }
}

/// Options for [`ingest_dir`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DirOptions {
    /// Count files and chunks without embedding or writing.
    pub dry_run: bool,
    /// Remove indexed sources whose file no longer exists.
    pub prune: bool,
}

/// Totals of a directory run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirSummary {
    pub files: usize,
    pub chunks: usize,
    pub pruned: Vec<String>,
}

/// Read every file under `dir` with a configured extension.
///
/// Source ids are paths relative to `dir` with `/` separators, sorted.
pub fn scan_dir(dir: &Path, extensions: &[String]) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        bail!("Docs directory does not exist: {}", dir.display());
    }

    let matcher = build_extension_set(extensions)?;
    let mut documents = Vec::new();

    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        let source_id = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if !matcher.is_match(&source_id) {
            continue;
        }

        let raw_text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        documents.push(Document {
            source_id,
            raw_text,
        });
    }

    documents.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    Ok(documents)
}

fn build_extension_set(extensions: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for ext in extensions {
        let ext = ext.trim_start_matches('.');
        let glob = GlobBuilder::new(&format!("**/*.{}", ext))
            .case_insensitive(true)
            .build()
            .with_context(|| format!("Invalid extension: {}", ext))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Ingest a whole directory, one document at a time.
///
/// Stops at the first failing document; documents already ingested stay
/// ingested.
pub async fn ingest_dir(
    config: &Config,
    ingestor: &Ingestor,
    dir: &Path,
    options: DirOptions,
) -> Result<DirSummary> {
    let documents = scan_dir(dir, &config.ingest.extensions)?;

    if options.dry_run {
        let chunks: usize = documents
            .iter()
            .map(|d| chunk_text(&d.source_id, &d.raw_text, config.chunking.max_tokens).len())
            .sum();
        println!("ingest {} (dry-run)", dir.display());
        println!("  files found: {}", documents.len());
        println!("  estimated chunks: {}", chunks);
        return Ok(DirSummary {
            files: documents.len(),
            chunks,
            pruned: Vec::new(),
        });
    }

    ingestor.ensure_index().await?;

    println!("ingest {}", dir.display());
    let mut summary = DirSummary::default();
    for document in &documents {
        let report = ingestor.ingest(document).await?;
        println!("  {}: {} chunks", document.source_id, report.chunk_count);
        summary.files += 1;
        summary.chunks += report.chunk_count;
    }

    if options.prune {
        let present: HashSet<&str> = documents.iter().map(|d| d.source_id.as_str()).collect();
        for record in ingestor.index.sources(ingestor.index_name()).await? {
            if present.contains(record.source.as_str()) {
                continue;
            }
            let removed = ingestor
                .index
                .delete_by_source(ingestor.index_name(), &record.source)
                .await?;
            println!("  pruned {} ({} entries)", record.source, removed);
            summary.pruned.push(record.source);
        }
    }

    println!("  files: {}", summary.files);
    println!("  chunks written: {}", summary.chunks);
    println!("ok");

    Ok(summary)
}
