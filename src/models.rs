//! Core data models used throughout the RAG pipeline.
//!
//! Ingestion types ([`Document`], [`Chunk`], [`IndexEntry`]) flow from the
//! filesystem into the vector index. Query types ([`RetrievalRequest`],
//! [`SynthesisRequest`], [`WorkflowInput`], [`WorkflowResult`]) are scoped
//! to a single question and validated on construction.

use serde::{Deserialize, Serialize};

use crate::error::RagError;

/// Smallest accepted retrieval limit.
pub const MIN_LIMIT: usize = 1;
/// Largest accepted retrieval limit.
pub const MAX_LIMIT: usize = 50;
/// Retrieval limit used when the caller does not supply one.
pub const DEFAULT_LIMIT: usize = 5;

/// A source document read from the corpus.
#[derive(Debug, Clone)]
pub struct Document {
    /// Stable identifier, usually the path relative to the docs directory.
    pub source_id: String,
    pub raw_text: String,
}

/// A contiguous slice of a document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source_id: String,
    /// Ordinal position within the source, starting at 0.
    pub index: usize,
    pub text: String,
}

/// Metadata stored next to every vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub text: String,
    pub source: String,
    #[serde(rename = "chunkIndex")]
    pub chunk_index: usize,
}

/// One row of the vector index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Deterministic chunk id, see [`crate::chunk::chunk_id`].
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: EntryMetadata,
}

/// Response tone requested from the synthesis stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Neutral,
    #[default]
    Helpful,
    Executive,
}

impl Tone {
    /// Instruction fragment embedded in the generation prompt.
    pub fn hint(self) -> &'static str {
        match self {
            Tone::Neutral => "neutral, factual tone",
            Tone::Helpful => "friendly, concise, helpful tone",
            Tone::Executive => "concise executive summary tone",
        }
    }
}

impl std::str::FromStr for Tone {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "neutral" => Ok(Tone::Neutral),
            "helpful" => Ok(Tone::Helpful),
            "executive" => Ok(Tone::Executive),
            other => Err(RagError::invalid(format!(
                "unknown tone '{}': expected neutral, helpful, or executive",
                other
            ))),
        }
    }
}

/// Response language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Id,
    En,
}

impl Language {
    /// Instruction fragment embedded in the generation prompt.
    pub fn hint(self) -> &'static str {
        match self {
            Language::Id => "clear and concise Bahasa Indonesia",
            Language::En => "clear and concise English",
        }
    }

    /// Answer returned when retrieval finds nothing.
    pub fn no_results_message(self) -> &'static str {
        match self {
            Language::Id => {
                "Maaf, tidak ditemukan informasi produk yang relevan untuk pertanyaan Anda."
            }
            Language::En => "Sorry, no relevant product information found for your question.",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Language::Id),
            "en" => Ok(Language::En),
            other => Err(RagError::invalid(format!(
                "unknown language '{}': expected id or en",
                other
            ))),
        }
    }
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn check_limit(limit: usize) -> Result<(), RagError> {
    if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        return Err(RagError::invalid(format!(
            "limit must be between {} and {}, got {}",
            MIN_LIMIT, MAX_LIMIT, limit
        )));
    }
    Ok(())
}

/// Input of the retrieval stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, limit: usize) -> Result<Self, RagError> {
        let req = Self {
            query: query.into(),
            limit,
        };
        req.validate()?;
        Ok(req)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        if self.query.trim().is_empty() {
            return Err(RagError::invalid("query must not be empty"));
        }
        check_limit(self.limit)
    }
}

/// Output of the retrieval stage: snippets in ranked order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub snippets: Vec<String>,
}

impl SearchResult {
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

/// Input of the synthesis stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub question: String,
    pub snippets: Vec<String>,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub language: Language,
}

impl SynthesisRequest {
    pub fn new(
        question: impl Into<String>,
        snippets: Vec<String>,
        tone: Tone,
        language: Language,
    ) -> Result<Self, RagError> {
        let req = Self {
            question: question.into(),
            snippets,
            tone,
            language,
        };
        req.validate()?;
        Ok(req)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        if self.question.trim().is_empty() {
            return Err(RagError::invalid("question must not be empty"));
        }
        if self.snippets.is_empty() {
            return Err(RagError::invalid("snippets must contain at least one element"));
        }
        Ok(())
    }
}

/// Input of the product workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub language: Language,
}

impl WorkflowInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: DEFAULT_LIMIT,
            tone: Tone::default(),
            language: Language::default(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn retrieval_request(&self) -> Result<RetrievalRequest, RagError> {
        RetrievalRequest::new(self.query.clone(), self.limit)
    }
}

/// The single externally visible result of the product workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub answer: String,
    pub snippets: Vec<String>,
    pub query: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_bounds() {
        assert!(RetrievalRequest::new("phone", 0).is_err());
        assert!(RetrievalRequest::new("phone", 51).is_err());
        assert!(RetrievalRequest::new("phone", 1).is_ok());
        assert!(RetrievalRequest::new("phone", 50).is_ok());
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(RetrievalRequest::new("   ", 5).is_err());
    }

    #[test]
    fn test_synthesis_requires_snippets() {
        let err = SynthesisRequest::new("q", vec![], Tone::Helpful, Language::Id).unwrap_err();
        assert!(err.to_string().contains("snippets"));
    }

    #[test]
    fn test_workflow_input_defaults() {
        let input: WorkflowInput = serde_json::from_str(r#"{"query":"laptop"}"#).unwrap();
        assert_eq!(input.limit, 5);
        assert_eq!(input.tone, Tone::Helpful);
        assert_eq!(input.language, Language::Id);
    }

    #[test]
    fn test_enum_wire_names() {
        let input: WorkflowInput = serde_json::from_str(
            r#"{"query":"laptop","limit":3,"tone":"executive","language":"en"}"#,
        )
        .unwrap();
        assert_eq!(input.tone, Tone::Executive);
        assert_eq!(input.language, Language::En);
        assert!(serde_json::from_str::<WorkflowInput>(r#"{"query":"x","tone":"rude"}"#).is_err());
    }

    #[test]
    fn test_entry_metadata_field_names() {
        let meta = EntryMetadata {
            text: "t".to_string(),
            source: "a.md".to_string(),
            chunk_index: 2,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["chunkIndex"], 2);
    }
}
