//! Shared fakes for the integration tests.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use product_rag::embedding::Embedder;
use product_rag::generation::Generator;
use product_rag::index::{InMemoryIndex, VectorIndex};
use product_rag::retrieval::Retriever;
use product_rag::synthesis::Synthesizer;
use product_rag::workflow::ProductWorkflow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const INDEX: &str = "product_docs";

// ─── Keyword Embedder ───────────────────────────────────────────────

/// Embeds text as keyword counts over a fixed vocabulary, plus a small
/// constant component so no vector is all zeros.
pub struct KeywordEmbedder {
    model: String,
    vocab: Vec<&'static str>,
    calls: Mutex<Vec<Vec<String>>>,
    failing: AtomicBool,
    drop_last: AtomicBool,
}

impl KeywordEmbedder {
    pub fn new(vocab: &[&'static str]) -> Self {
        Self::with_model("keyword-test", vocab)
    }

    pub fn with_model(model: &str, vocab: &[&'static str]) -> Self {
        Self {
            model: model.to_string(),
            vocab: vocab.to_vec(),
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            drop_last: AtomicBool::new(false),
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = self
            .vocab
            .iter()
            .map(|w| lower.matches(w).count() as f32)
            .collect();
        v.push(0.1);
        v
    }

    /// Every batch passed to `embed`, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Return one vector fewer than requested.
    pub fn set_drop_last(&self, drop_last: bool) {
        self.drop_last.store(drop_last, Ordering::SeqCst);
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.vocab.len() + 1
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.lock().unwrap().push(texts.to_vec());
        if self.failing.load(Ordering::SeqCst) {
            bail!("embedding provider unavailable");
        }
        let mut out: Vec<Vec<f32>> = texts.iter().map(|t| self.vector(t)).collect();
        if self.drop_last.load(Ordering::SeqCst) {
            out.pop();
        }
        Ok(out)
    }
}

// ─── Scripted Generator ─────────────────────────────────────────────

/// Replays fixed fragments and records every prompt it receives.
pub struct ScriptedGenerator {
    fragments: Vec<String>,
    fail_with: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            fail_with: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Emits `fragments`, then fails with `message`.
    pub fn failing(fragments: &[&str], message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::new(fragments)
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(msg) = &self.fail_with {
            bail!("{}", msg);
        }
        Ok(self.fragments.concat())
    }

    async fn stream(&self, prompt: &str, out: mpsc::Sender<String>) -> Result<()> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        for f in &self.fragments {
            if out.send(f.clone()).await.is_err() {
                return Ok(());
            }
        }
        if let Some(msg) = &self.fail_with {
            bail!("{}", msg);
        }
        Ok(())
    }
}

// ─── Wiring ─────────────────────────────────────────────────────────

pub fn vocab() -> Vec<&'static str> {
    vec!["warranty", "battery", "price", "screen", "shipping"]
}

pub fn memory_index() -> Arc<InMemoryIndex> {
    Arc::new(InMemoryIndex::new())
}

pub fn workflow(
    embedder: Arc<KeywordEmbedder>,
    generator: Arc<ScriptedGenerator>,
    index: Arc<dyn VectorIndex>,
) -> ProductWorkflow {
    ProductWorkflow::new(
        Retriever::new(embedder, index, INDEX),
        Synthesizer::new(generator),
    )
}
