//! Synthesis stage: question + snippets → answer.
//!
//! One prompt is built per request ([`build_prompt`]) and sent to the
//! configured [`Generator`]. Provider errors propagate unchanged; there is
//! no fallback text at this layer.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::delivery::{self, DeliveryEvent};
use crate::generation::Generator;
use crate::models::SynthesisRequest;

/// Render the generation prompt for `request`.
///
/// Snippets are numbered from 1 in the order given.
pub fn build_prompt(request: &SynthesisRequest) -> String {
    let snippets = request
        .snippets
        .iter()
        .enumerate()
        .map(|(i, s)| format!("({}) {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a product assistant. The user asked: \"{question}\".\n\
         You are given RAG snippets (may be noisy/duplicated). Produce a short, well-structured answer in {language} with {tone}.\n\
         Rules:\n\
         - Keep only facts implied by the snippets.\n\
         - Remove noise and duplication.\n\
         - Use short paragraphs or bullet points where helpful.\n\
         - If the snippets conflict, state the most likely interpretation.\n\
         - End with 1-2 actionable suggestions if relevant.\n\
         \n\
         Snippets:\n\
         {snippets}\n",
        question = request.question,
        language = request.language.hint(),
        tone = request.tone.hint(),
        snippets = snippets,
    )
}

pub struct Synthesizer {
    generator: Arc<dyn Generator>,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    /// Generate the answer text, returned verbatim.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<String> {
        request.validate()?;
        let prompt = build_prompt(request);
        self.generator
            .generate(&prompt)
            .await
            .with_context(|| format!("Generation failed ({})", self.generator.model_name()))
    }

    /// Stream the answer as delivery events.
    ///
    /// Validation happens before anything is spawned, so an invalid
    /// request is an `Err` rather than an in-band `error` event.
    pub fn synthesize_stream(
        &self,
        request: &SynthesisRequest,
    ) -> Result<mpsc::Receiver<DeliveryEvent>> {
        request.validate()?;
        Ok(delivery::deliver(
            Arc::clone(&self.generator),
            build_prompt(request),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Language, Tone};

    #[test]
    fn test_prompt_embeds_hints() {
        let req = SynthesisRequest::new(
            "How long is the warranty?",
            vec!["s1".to_string()],
            Tone::Executive,
            Language::En,
        )
        .unwrap();
        let prompt = build_prompt(&req);
        assert!(prompt.contains("concise executive summary tone"));
        assert!(prompt.contains("clear and concise English"));
        assert!(prompt.contains("The user asked: \"How long is the warranty?\""));
    }

    #[test]
    fn test_prompt_numbers_snippets_in_order() {
        let req = SynthesisRequest::new(
            "q",
            vec!["first".to_string(), "second".to_string()],
            Tone::Neutral,
            Language::Id,
        )
        .unwrap();
        let prompt = build_prompt(&req);
        assert!(prompt.contains("Snippets:\n(1) first\n\n(2) second\n"));
        assert!(prompt.contains("neutral, factual tone"));
        assert!(prompt.contains("clear and concise Bahasa Indonesia"));
        assert!(prompt.contains("- End with 1-2 actionable suggestions if relevant."));
    }
}
