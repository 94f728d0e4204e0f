//! Ingestion pipeline tests against the in-memory index.

mod common;

use common::{memory_index, KeywordEmbedder, INDEX};
use product_rag::config::Config;
use product_rag::error::{classify, RagError};
use product_rag::index::VectorIndex;
use product_rag::ingest::{ingest_dir, DirOptions, Ingestor};
use product_rag::models::Document;
use std::sync::Arc;
use tempfile::TempDir;

/// Three paragraphs that chunk separately at `max_tokens = 2`.
const THREE: &str = "apple1\n\nbanana\n\ncherry";
const TWO: &str = "apple1\n\nbanana";

fn doc(source: &str, text: &str) -> Document {
    Document {
        source_id: source.to_string(),
        raw_text: text.to_string(),
    }
}

fn fruit_embedder() -> Arc<KeywordEmbedder> {
    Arc::new(KeywordEmbedder::new(&["apple", "banana", "cherry"]))
}

#[tokio::test]
async fn test_reingest_shorter_document_leaves_no_stale_chunks() {
    let embedder = fruit_embedder();
    let index = memory_index();
    let ingestor = Ingestor::new(embedder, index.clone(), INDEX, 2);

    let first = ingestor.ingest(&doc("a.md", THREE)).await.unwrap();
    assert_eq!(first.chunk_count, 3);
    assert_eq!(index.len(INDEX), 3);

    let second = ingestor.ingest(&doc("a.md", TWO)).await.unwrap();
    assert_eq!(second.chunk_count, 2);
    assert_eq!(index.len(INDEX), 2);

    let records = index.sources(INDEX).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source, "a.md");
    assert_eq!(records[0].chunk_count, 2);
}

#[tokio::test]
async fn test_reingest_same_document_is_idempotent() {
    let index = memory_index();
    let ingestor = Ingestor::new(fruit_embedder(), index.clone(), INDEX, 2);

    ingestor.ingest(&doc("a.md", THREE)).await.unwrap();
    ingestor.ingest(&doc("a.md", THREE)).await.unwrap();
    assert_eq!(index.len(INDEX), 3);
}

#[tokio::test]
async fn test_batch_order_is_preserved() {
    let embedder = fruit_embedder();
    let index = memory_index();
    let ingestor = Ingestor::new(embedder.clone(), index.clone(), INDEX, 2);

    ingestor.ingest(&doc("a.md", THREE)).await.unwrap();

    let calls = embedder.calls();
    assert_eq!(calls.len(), 1, "all chunks go out in a single batch");
    assert_eq!(calls[0], vec!["apple1", "banana", "cherry"]);

    let hits = index
        .search(INDEX, &embedder.vector("banana"), 1)
        .await
        .unwrap();
    assert_eq!(hits[0].text, "banana");
    assert_eq!(hits[0].chunk_index, 1);
    assert!((hits[0].score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_empty_document_touches_nothing() {
    let embedder = fruit_embedder();
    let index = memory_index();
    let ingestor = Ingestor::new(embedder.clone(), index.clone(), INDEX, 2);

    let report = ingestor.ingest(&doc("empty.md", "  \n\n  ")).await.unwrap();
    assert_eq!(report.chunk_count, 0);
    assert!(embedder.calls().is_empty());
    assert!(index.describe(INDEX).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_embedding_writes_nothing() {
    let embedder = fruit_embedder();
    let index = memory_index();
    let ingestor = Ingestor::new(embedder.clone(), index.clone(), INDEX, 2);

    ingestor.ingest(&doc("a.md", THREE)).await.unwrap();

    embedder.set_failing(true);
    let err = ingestor.ingest(&doc("a.md", TWO)).await.unwrap_err();
    assert!(format!("{:#}", err).contains("provider unavailable"));

    // The previous version of the document is untouched.
    assert_eq!(index.len(INDEX), 3);
    assert_eq!(index.sources(INDEX).await.unwrap()[0].chunk_count, 3);
}

#[tokio::test]
async fn test_short_batch_is_rejected() {
    let embedder = fruit_embedder();
    embedder.set_drop_last(true);
    let index = memory_index();
    let ingestor = Ingestor::new(embedder, index.clone(), INDEX, 2);

    let err = ingestor.ingest(&doc("a.md", THREE)).await.unwrap_err();
    assert!(matches!(
        classify(&err),
        Some(RagError::EmbeddingCount {
            expected: 3,
            actual: 2
        })
    ));
    assert!(index.is_empty(INDEX));
}

#[tokio::test]
async fn test_index_records_embedding_model() {
    let index = memory_index();
    let ingestor = Ingestor::new(fruit_embedder(), index.clone(), INDEX, 2);
    ingestor.ensure_index().await.unwrap();
    ingestor.ensure_index().await.unwrap();

    let spec = index.describe(INDEX).await.unwrap().unwrap();
    assert_eq!(spec.dims, 4);
    assert_eq!(spec.model, "keyword-test");
}

// ─── Directory ingestion ────────────────────────────────────────────

fn write_docs(root: &std::path::Path) {
    std::fs::create_dir_all(root.join("phones")).unwrap();
    std::fs::write(root.join("phones/x1.md"), THREE).unwrap();
    std::fs::write(root.join("faq.txt"), TWO).unwrap();
    std::fs::write(root.join("logo.svg"), "<svg/>").unwrap();
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.index.url = Some("memory:".to_string());
    config.chunking.max_tokens = 2;
    config
}

#[tokio::test]
async fn test_other_model_cannot_write_into_index() {
    let index = memory_index();
    let vocab = ["apple", "banana", "cherry"];
    let model_a = Arc::new(KeywordEmbedder::with_model("model-a", &vocab));
    let model_b = Arc::new(KeywordEmbedder::with_model("model-b", &vocab));

    Ingestor::new(model_a, index.clone(), INDEX, 2)
        .ingest(&doc("a.md", THREE))
        .await
        .unwrap();

    let other = Ingestor::new(model_b.clone(), index.clone(), INDEX, 2);
    let err = other.ingest(&doc("b.md", TWO)).await.unwrap_err();
    assert!(matches!(
        classify(&err),
        Some(RagError::ModelMismatch { indexed, query, .. })
            if indexed == "model-a" && query == "model-b"
    ));

    assert!(model_b.calls().is_empty());
    assert_eq!(index.len(INDEX), 3);
    assert_eq!(index.describe(INDEX).await.unwrap().unwrap().model, "model-a");
}

#[tokio::test]
async fn test_ingest_dir_and_prune() {
    let tmp = TempDir::new().unwrap();
    write_docs(tmp.path());
    let config = test_config();
    let index = memory_index();
    let ingestor = Ingestor::new(fruit_embedder(), index.clone(), INDEX, 2);

    let summary = ingest_dir(&config, &ingestor, tmp.path(), DirOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.files, 2);
    assert_eq!(summary.chunks, 5);
    assert_eq!(index.len(INDEX), 5);

    std::fs::remove_file(tmp.path().join("faq.txt")).unwrap();
    let summary = ingest_dir(
        &config,
        &ingestor,
        tmp.path(),
        DirOptions {
            dry_run: false,
            prune: true,
        },
    )
    .await
    .unwrap();
    assert_eq!(summary.pruned, vec!["faq.txt".to_string()]);
    assert_eq!(index.len(INDEX), 3);

    let sources: Vec<String> = index
        .sources(INDEX)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.source)
        .collect();
    assert_eq!(sources, vec!["phones/x1.md".to_string()]);
}

#[tokio::test]
async fn test_ingest_dir_dry_run() {
    let tmp = TempDir::new().unwrap();
    write_docs(tmp.path());
    let embedder = fruit_embedder();
    let index = memory_index();
    let ingestor = Ingestor::new(embedder.clone(), index.clone(), INDEX, 2);

    let summary = ingest_dir(
        &test_config(),
        &ingestor,
        tmp.path(),
        DirOptions {
            dry_run: true,
            prune: false,
        },
    )
    .await
    .unwrap();

    assert_eq!(summary.files, 2);
    assert_eq!(summary.chunks, 5);
    assert!(embedder.calls().is_empty());
    assert!(index.is_empty(INDEX));
}
