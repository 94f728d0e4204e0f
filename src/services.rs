//! Provider handles shared by every command.
//!
//! [`Services`] is built once at startup from the [`Config`], handed to
//! the pipeline stages by reference, and closed once on the way out.

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::generation::{create_generator, Generator};
use crate::index::{self, VectorIndex};
use crate::ingest::Ingestor;
use crate::retrieval::Retriever;
use crate::synthesis::Synthesizer;
use crate::workflow::ProductWorkflow;

#[derive(Clone)]
pub struct Services {
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub index: Arc<dyn VectorIndex>,
    pub index_name: String,
    pub max_tokens: usize,
}

impl Services {
    /// Construct providers and open the vector index.
    pub async fn connect(config: &Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let index = index::connect(config.index_url()?).await?;

        tracing::debug!(
            embedding = embedder.model_name(),
            generation = generator.model_name(),
            index = %config.index.name,
            "services ready"
        );

        Ok(Self {
            embedder,
            generator,
            index,
            index_name: config.index.name.clone(),
            max_tokens: config.chunking.max_tokens,
        })
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
            self.index_name.clone(),
            self.max_tokens,
        )
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
            self.index_name.clone(),
        )
    }

    pub fn synthesizer(&self) -> Synthesizer {
        Synthesizer::new(Arc::clone(&self.generator))
    }

    pub fn workflow(&self) -> ProductWorkflow {
        ProductWorkflow::new(self.retriever(), self.synthesizer())
    }

    pub async fn close(&self) {
        self.index.close().await;
    }
}
