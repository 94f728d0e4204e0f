//! # Product RAG
//!
//! Retrieval-augmented answers over a product documentation corpus.
//!
//! Documents are chunked, embedded in one batch per document and written
//! to a named vector index. Questions are embedded, matched against the
//! index, and the top snippets are handed to a chat model that writes the
//! answer, either whole or streamed as server-sent events.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │ docs dir │──▶│ chunk+embed  │──▶│ vector index │
//! └──────────┘   └──────────────┘   └──────┬───────┘
//!                                          │
//!        ┌─────────────────────────────────┘
//!        ▼
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ retrieve │──▶│synthesize│──▶│ delivery │──▶│ HTTP/SSE │
//! └──────────┘   └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export VECTOR_STORE_URL=sqlite:./data/rag.sqlite
//! rag init
//! rag ingest --dir ./data/new-docs
//! rag ask "Berapa lama garansi produk ini?"
//! rag serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`error`] | Typed error kinds recovered at the HTTP boundary |
//! | [`models`] | Request/response records and validation |
//! | [`chunk`] | Paragraph-aware chunking and chunk ids |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Chat-model providers, whole and streamed |
//! | [`index`] | Vector index trait with SQLite and in-memory backends |
//! | [`ingest`] | Per-document and directory ingestion |
//! | [`retrieval`] | Query → ranked snippets |
//! | [`synthesis`] | Snippets → answer prompt and generation |
//! | [`delivery`] | Fragment stream → delivery events |
//! | [`workflow`] | Retrieval then synthesis, with the empty-result short-circuit |
//! | [`agents`] | Named agents served over HTTP |
//! | [`services`] | Provider construction and teardown |
//! | [`server`] | Axum HTTP server |

pub mod agents;
pub mod chunk;
pub mod config;
pub mod delivery;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod models;
pub mod retrieval;
pub mod server;
pub mod services;
pub mod synthesis;
pub mod workflow;
