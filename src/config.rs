//! Configuration loading.
//!
//! Settings come from an optional TOML file, then environment overrides:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `VECTOR_STORE_URL` | `index.url` |
//! | `RAG_DOCS_DIR` | `ingest.docs_dir` |
//! | `EMBEDDING_MODEL` | `embedding.model` |
//! | `EMBEDDING_DIM` | `embedding.dims` |
//! | `GENERATION_MODEL` | `generation.model` |
//! | `RAG_BIND` | `server.bind` |
//!
//! A missing vector-store URL is a configuration error; the binary exits
//! non-zero before doing any work.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::{MAX_LIMIT, MIN_LIMIT};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// `sqlite:<path>` or `memory:`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_index_name")]
    pub name: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: None,
            name: default_index_name(),
        }
    }
}

fn default_index_name() -> String {
    "product_docs".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
            extensions: default_extensions(),
        }
    }
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("./data/new-docs")
}

fn default_extensions() -> Vec<String> {
    ["md", "txt", "json", "csv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    128
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai`, `ollama`, or `local`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL override (OpenAI-compatible gateway or Ollama host).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `openai` or `ollama`.
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}
fn default_generation_model() -> String {
    "gpt-5-nano".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    crate::models::DEFAULT_LIMIT
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Allowed CORS origins; empty means any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Config {
    /// Vector-store connection string. Validated to be present by [`load_config`].
    pub fn index_url(&self) -> Result<&str> {
        match self.index.url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => bail!("Missing vector store connection string: set index.url or VECTOR_STORE_URL"),
        }
    }

    /// Apply overrides from an environment lookup function.
    ///
    /// Takes the lookup as a parameter so tests do not touch the process
    /// environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("VECTOR_STORE_URL") {
            self.index.url = Some(url);
        }
        if let Some(dir) = lookup("RAG_DOCS_DIR") {
            self.ingest.docs_dir = PathBuf::from(dir);
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(dims) = lookup("EMBEDDING_DIM") {
            self.embedding.dims = dims
                .trim()
                .parse()
                .with_context(|| format!("EMBEDDING_DIM is not a number: {}", dims))?;
        }
        if let Some(model) = lookup("GENERATION_MODEL") {
            self.generation.model = model;
        }
        if let Some(bind) = lookup("RAG_BIND") {
            self.server.bind = bind;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.index_url()?;

        if self.index.name.trim().is_empty() {
            bail!("index.name must not be empty");
        }
        if self.chunking.max_tokens == 0 {
            bail!("chunking.max_tokens must be > 0");
        }
        if self.embedding.model.trim().is_empty() {
            bail!("embedding.model must be specified");
        }
        if self.embedding.dims == 0 {
            bail!("embedding.dims must be > 0");
        }
        if self.generation.model.trim().is_empty() {
            bail!("generation.model must be specified");
        }
        if !(MIN_LIMIT..=MAX_LIMIT).contains(&self.retrieval.default_limit) {
            bail!(
                "retrieval.default_limit must be in [{}, {}]",
                MIN_LIMIT,
                MAX_LIMIT
            );
        }

        match self.embedding.provider.as_str() {
            "openai" | "ollama" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be openai, ollama, or local.",
                other
            ),
        }
        match self.generation.provider.as_str() {
            "openai" | "ollama" => {}
            other => bail!(
                "Unknown generation provider: '{}'. Must be openai or ollama.",
                other
            ),
        }

        Ok(())
    }
}

/// Parse a TOML document into a [`Config`] without validating it.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Load the config file (if present), apply environment overrides, validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        Config::default()
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
