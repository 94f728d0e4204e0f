//! The product workflow: retrieval, then synthesis.
//!
//! ```text
//! Init ──search──▶ Searched ──synthesize──▶ Done
//!                     │
//!                     └── no snippets ─────▶ Done (localized fallback)
//! ```
//!
//! Stages run strictly in sequence. Synthesis is never called with zero
//! snippets; an empty retrieval finishes with the language's
//! "nothing found" message and an empty snippet list.

use anyhow::Result;
use tokio::sync::mpsc;

use crate::delivery::{self, DeliveryEvent};
use crate::models::{SearchResult, SynthesisRequest, WorkflowInput, WorkflowResult};
use crate::retrieval::Retriever;
use crate::synthesis::Synthesizer;

enum Stage {
    Init(WorkflowInput),
    Searched {
        input: WorkflowInput,
        found: SearchResult,
    },
    Done(WorkflowResult),
}

impl From<Retrieved> for Stage {
    fn from(retrieved: Retrieved) -> Self {
        match retrieved {
            Retrieved::Found { input, found } => Stage::Searched { input, found },
            Retrieved::Empty(result) => Stage::Done(result),
        }
    }
}

/// Outcome of the retrieval step.
enum Retrieved {
    Found {
        input: WorkflowInput,
        found: SearchResult,
    },
    Empty(WorkflowResult),
}

/// A workflow run whose answer is still being streamed.
pub struct WorkflowStream {
    pub query: String,
    pub snippets: Vec<String>,
    pub events: mpsc::Receiver<DeliveryEvent>,
}

pub struct ProductWorkflow {
    retriever: Retriever,
    synthesizer: Synthesizer,
}

impl ProductWorkflow {
    pub fn new(retriever: Retriever, synthesizer: Synthesizer) -> Self {
        Self {
            retriever,
            synthesizer,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn synthesizer(&self) -> &Synthesizer {
        &self.synthesizer
    }

    /// Run to completion.
    pub async fn run(&self, input: WorkflowInput) -> Result<WorkflowResult> {
        let mut stage = Stage::Init(input);
        loop {
            stage = match stage {
                Stage::Init(input) => self.search(input).await?.into(),
                Stage::Searched { input, found } => {
                    let request = SynthesisRequest::new(
                        input.query.clone(),
                        found.snippets,
                        input.tone,
                        input.language,
                    )?;
                    let answer = self.synthesizer.synthesize(&request).await?;
                    Stage::Done(WorkflowResult {
                        answer,
                        snippets: request.snippets,
                        query: input.query,
                    })
                }
                Stage::Done(result) => return Ok(result),
            };
        }
    }

    /// Run retrieval, then stream the synthesized answer.
    ///
    /// Retrieval and validation failures are returned as `Err` before any
    /// event is produced.
    pub async fn run_streaming(&self, input: WorkflowInput) -> Result<WorkflowStream> {
        match self.search(input).await? {
            Retrieved::Found { input, found } => {
                let request = SynthesisRequest::new(
                    input.query.clone(),
                    found.snippets,
                    input.tone,
                    input.language,
                )?;
                let events = self.synthesizer.synthesize_stream(&request)?;
                Ok(WorkflowStream {
                    query: input.query,
                    snippets: request.snippets,
                    events,
                })
            }
            Retrieved::Empty(result) => Ok(WorkflowStream {
                query: result.query,
                snippets: result.snippets,
                events: delivery::immediate(result.answer),
            }),
        }
    }

    async fn search(&self, input: WorkflowInput) -> Result<Retrieved> {
        let request = input.retrieval_request()?;
        let found = self.retriever.search(&request).await?;

        if found.is_empty() {
            tracing::info!(query = %input.query, "no snippets, skipping synthesis");
            return Ok(Retrieved::Empty(WorkflowResult {
                answer: input.language.no_results_message().to_string(),
                snippets: Vec::new(),
                query: input.query,
            }));
        }

        Ok(Retrieved::Found { input, found })
    }
}
