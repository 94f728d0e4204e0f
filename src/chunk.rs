//! Paragraph-boundary text chunker.
//!
//! Splits document text into [`Chunk`]s that respect a configurable
//! `max_tokens` limit. Splitting occurs on paragraph boundaries (`\n\n`)
//! so that each chunk stays semantically coherent.
//!
//! Chunking is deterministic: the same text always yields the same
//! boundaries and count, so [`chunk_id`] stays stable across re-ingestion
//! runs and re-upserting a document overwrites its entries in place.
//!
//! # Algorithm
//!
//! 1. Convert `max_tokens` to `max_chars` using a 4 chars/token ratio.
//! 2. Split text on `\n\n` paragraph boundaries.
//! 3. Accumulate paragraphs into a buffer until adding the next paragraph
//!    would exceed `max_chars`, then flush the buffer as a chunk.
//! 4. If a single paragraph exceeds `max_chars`, hard-split it at the
//!    nearest newline or space boundary.
//! 5. Empty or whitespace-only text yields no chunks.
//!
//! # Example
//!
//! ```rust
//! use product_rag::chunk::{chunk_id, chunk_text};
//!
//! let chunks = chunk_text("guide.md", "Hello world.\n\nSecond paragraph.", 128);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].index, 0);
//! assert_eq!(chunk_id("guide.md", 0), chunk_id("guide.md", 0));
//! ```

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into chunks on paragraph boundaries, respecting `max_tokens`.
///
/// Returned chunks have contiguous indices `0, 1, …, N-1`.
pub fn chunk_text(source_id: &str, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN).max(1);
    let mut chunks = Vec::new();

    if text.trim().is_empty() {
        return chunks;
    }

    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            push_chunk(&mut chunks, source_id, &current_buf);
            current_buf.clear();
        }

        if trimmed.len() > max_chars {
            hard_split(&mut chunks, source_id, trimmed, max_chars);
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        push_chunk(&mut chunks, source_id, &current_buf);
    }

    chunks
}

/// Deterministic identifier for the chunk at `index` of `source_id`.
///
/// Hex-encoded SHA-256 of `"{source_id}#{index}"`.
pub fn chunk_id(source_id: &str, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}#{}", source_id, index).as_bytes());
    hex::encode(hasher.finalize())
}

fn push_chunk(chunks: &mut Vec<Chunk>, source_id: &str, text: &str) {
    chunks.push(Chunk {
        source_id: source_id.to_string(),
        index: chunks.len(),
        text: text.to_string(),
    });
}

/// Split an oversized paragraph at newline/space boundaries.
fn hard_split(chunks: &mut Vec<Chunk>, source_id: &str, paragraph: &str, max_chars: usize) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        let limit = snap_to_char_boundary(remaining, remaining.len().min(max_chars));
        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        let split_at = if split_at == 0 {
            next_char_boundary(remaining)
        } else {
            split_at
        };

        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            push_chunk(chunks, source_id, piece);
        }
        remaining = &remaining[split_at..];
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Byte offset just past the first character.
fn next_char_boundary(s: &str) -> usize {
    s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
}
