//! Retrieval, synthesis and the product workflow end to end, with fake
//! providers.

mod common;

use common::{memory_index, vocab, workflow, KeywordEmbedder, ScriptedGenerator, INDEX};
use product_rag::delivery::{drain, DeliveryEvent};
use product_rag::error::{classify, RagError};
use product_rag::index::VectorIndex;
use product_rag::ingest::Ingestor;
use product_rag::models::{Document, Language, RetrievalRequest, Tone, WorkflowInput};
use product_rag::retrieval::Retriever;
use std::sync::Arc;

const ID_FALLBACK: &str =
    "Maaf, tidak ditemukan informasi produk yang relevan untuk pertanyaan Anda.";
const EN_FALLBACK: &str = "Sorry, no relevant product information found for your question.";

async fn seeded_index(embedder: Arc<KeywordEmbedder>) -> Arc<dyn VectorIndex> {
    let index = memory_index();
    let ingestor = Ingestor::new(embedder, index.clone(), INDEX, 16);
    let docs = [
        (
            "x1.md",
            "The X1 warranty covers two years.\n\nClaims need the receipt.",
        ),
        ("battery.md", "Battery lasts a full day on one charge."),
        ("shipping.md", "Shipping takes three days."),
    ];
    for (source, text) in docs {
        ingestor
            .ingest(&Document {
                source_id: source.to_string(),
                raw_text: text.to_string(),
            })
            .await
            .unwrap();
    }
    index
}

// ─── Retrieval ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_search_ranks_matching_snippets_first() {
    let embedder = Arc::new(KeywordEmbedder::new(&vocab()));
    let index = seeded_index(embedder.clone()).await;
    let retriever = Retriever::new(embedder, index, INDEX);

    let result = retriever
        .search(&RetrievalRequest::new("warranty", 2).unwrap())
        .await
        .unwrap();
    assert_eq!(result.snippets.len(), 2);
    assert!(result.snippets[0].starts_with("The X1 warranty"));

    let result = retriever
        .search(&RetrievalRequest::new("battery", 50).unwrap())
        .await
        .unwrap();
    assert_eq!(result.snippets.len(), 3);
    assert!(result.snippets[0].starts_with("Battery lasts"));
}

#[tokio::test]
async fn test_search_on_missing_index_is_empty() {
    let embedder = Arc::new(KeywordEmbedder::new(&vocab()));
    let retriever = Retriever::new(embedder.clone(), memory_index(), INDEX);

    let result = retriever
        .search(&RetrievalRequest::new("warranty", 5).unwrap())
        .await
        .unwrap();
    assert!(result.is_empty());
    assert!(embedder.calls().is_empty());
}

#[tokio::test]
async fn test_search_rejects_other_embedding_model() {
    let ingest_embedder = Arc::new(KeywordEmbedder::new(&vocab()));
    let index = seeded_index(ingest_embedder).await;
    let query_embedder = Arc::new(KeywordEmbedder::with_model("other-model", &vocab()));
    let retriever = Retriever::new(query_embedder, index, INDEX);

    let err = retriever
        .search(&RetrievalRequest::new("warranty", 5).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        classify(&err),
        Some(RagError::ModelMismatch { .. })
    ));
}

#[tokio::test]
async fn test_query_embedding_failure_propagates() {
    let embedder = Arc::new(KeywordEmbedder::new(&vocab()));
    let index = seeded_index(embedder.clone()).await;
    embedder.set_failing(true);
    let retriever = Retriever::new(embedder, index, INDEX);

    assert!(retriever
        .search(&RetrievalRequest::new("warranty", 5).unwrap())
        .await
        .is_err());
}

// ─── Workflow ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_empty_retrieval_short_circuits_in_indonesian() {
    let embedder = Arc::new(KeywordEmbedder::new(&vocab()));
    let generator = Arc::new(ScriptedGenerator::new(&["unused"]));
    let wf = workflow(embedder, generator.clone(), memory_index());

    let result = wf
        .run(WorkflowInput::new("nonexistent query"))
        .await
        .unwrap();
    assert_eq!(result.answer, ID_FALLBACK);
    assert!(result.snippets.is_empty());
    assert_eq!(result.query, "nonexistent query");
    assert!(generator.prompts().is_empty(), "synthesis must not run");
}

#[tokio::test]
async fn test_empty_retrieval_short_circuits_in_english() {
    let embedder = Arc::new(KeywordEmbedder::new(&vocab()));
    let generator = Arc::new(ScriptedGenerator::new(&["unused"]));
    let wf = workflow(embedder, generator.clone(), memory_index());

    let result = wf
        .run(WorkflowInput::new("anything").with_language(Language::En))
        .await
        .unwrap();
    assert_eq!(result.answer, EN_FALLBACK);
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn test_workflow_synthesizes_from_snippets() {
    let embedder = Arc::new(KeywordEmbedder::new(&vocab()));
    let index = seeded_index(embedder.clone()).await;
    let generator = Arc::new(ScriptedGenerator::new(&["Two-year ", "warranty."]));
    let wf = workflow(embedder, generator.clone(), index);

    let input = WorkflowInput::new("How long is the warranty?")
        .with_limit(1)
        .with_tone(Tone::Executive)
        .with_language(Language::En);
    let result = wf.run(input).await.unwrap();

    assert_eq!(result.answer, "Two-year warranty.");
    assert_eq!(result.snippets.len(), 1);
    assert!(result.snippets[0].contains("X1 warranty"));
    assert_eq!(result.query, "How long is the warranty?");

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("concise executive summary tone"));
    assert!(prompts[0].contains("clear and concise English"));
    assert!(prompts[0].contains("(1) The X1 warranty covers two years."));
}

#[tokio::test]
async fn test_generation_failure_is_not_masked() {
    let embedder = Arc::new(KeywordEmbedder::new(&vocab()));
    let index = seeded_index(embedder.clone()).await;
    let generator = Arc::new(ScriptedGenerator::failing(&[], "model overloaded"));
    let wf = workflow(embedder, generator, index);

    let err = wf.run(WorkflowInput::new("warranty")).await.unwrap_err();
    assert!(format!("{:#}", err).contains("model overloaded"));
}

#[tokio::test]
async fn test_invalid_limit_is_rejected_before_retrieval() {
    let embedder = Arc::new(KeywordEmbedder::new(&vocab()));
    let generator = Arc::new(ScriptedGenerator::new(&[]));
    let wf = workflow(embedder.clone(), generator, memory_index());

    for limit in [0, 51] {
        let err = wf
            .run(WorkflowInput::new("warranty").with_limit(limit))
            .await
            .unwrap_err();
        assert!(matches!(classify(&err), Some(RagError::InvalidInput(_))));
    }
    assert!(embedder.calls().is_empty());
}

// ─── Streaming ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_streaming_short_circuit_sends_fallback_then_done() {
    let embedder = Arc::new(KeywordEmbedder::new(&vocab()));
    let generator = Arc::new(ScriptedGenerator::new(&["unused"]));
    let wf = workflow(embedder, generator.clone(), memory_index());

    let run = wf.run_streaming(WorkflowInput::new("warranty")).await.unwrap();
    assert!(run.snippets.is_empty());
    let events = drain(run.events).await;
    assert_eq!(
        events,
        vec![
            DeliveryEvent::Delta(ID_FALLBACK.to_string()),
            DeliveryEvent::Done
        ]
    );
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn test_streaming_answer() {
    let embedder = Arc::new(KeywordEmbedder::new(&vocab()));
    let index = seeded_index(embedder.clone()).await;
    let generator = Arc::new(ScriptedGenerator::new(&["Hel", "lo"]));
    let wf = workflow(embedder, generator, index);

    let run = wf.run_streaming(WorkflowInput::new("battery")).await.unwrap();
    assert!(!run.snippets.is_empty());
    let events = drain(run.events).await;
    assert_eq!(
        events,
        vec![
            DeliveryEvent::Delta("Hel".to_string()),
            DeliveryEvent::Delta("lo".to_string()),
            DeliveryEvent::Done,
        ]
    );
}

#[tokio::test]
async fn test_streaming_failure_ends_with_error() {
    let embedder = Arc::new(KeywordEmbedder::new(&vocab()));
    let index = seeded_index(embedder.clone()).await;
    let generator = Arc::new(ScriptedGenerator::failing(&["Hel"], "stream reset"));
    let wf = workflow(embedder, generator, index);

    let mut run = wf.run_streaming(WorkflowInput::new("battery")).await.unwrap();
    let mut events = Vec::new();
    while let Some(event) = run.events.recv().await {
        events.push(event);
    }

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], DeliveryEvent::Delta("Hel".to_string()));
    assert!(matches!(&events[1], DeliveryEvent::Error(m) if m.contains("stream reset")));
    assert!(!events.contains(&DeliveryEvent::Done));
}
