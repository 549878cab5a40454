//! File content extraction: hashing and token-bounded chunking.

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Token budget per chunk.
pub const CHUNK_MAX_TOKENS: usize = 512;
/// Token overlap between adjacent chunks.
pub const CHUNK_OVERLAP_TOKENS: usize = 64;
/// Character approximation used in place of a real tokenizer, consistent
/// with the embedding stack's average for code and prose.
const APPROX_CHARS_PER_TOKEN: usize = 4;

/// Hex SHA-256 of the file's bytes plus its mtime in epoch seconds.
pub fn hash_file(path: &Path) -> io::Result<(String, f64)> {
    let bytes = fs::read(path)?;
    let hash = hex::encode(Sha256::digest(&bytes));

    let mtime = fs::metadata(path)?
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs_f64())
        .unwrap_or(0.0);

    Ok((hash, mtime))
}

/// Read `path` as UTF-8 (with replacement) and chunk it.
pub fn extract_chunks(path: &Path) -> io::Result<Vec<String>> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(chunk_text(&text))
}

/// Split `text` into overlapping chunks bounded by the token budget.
///
/// Chunks are emitted in source order, verbatim including the overlap
/// region. Whitespace-only chunks are dropped; empty input yields no
/// chunks.
pub fn chunk_text(text: &str) -> Vec<String> {
    chunk_text_with(text, CHUNK_MAX_TOKENS, CHUNK_OVERLAP_TOKENS)
}

fn chunk_text_with(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let max_chars = max_tokens * APPROX_CHARS_PER_TOKEN;
    let overlap_chars = overlap_tokens * APPROX_CHARS_PER_TOKEN;
    debug_assert!(overlap_chars < max_chars);

    let char_byte_indices: Vec<usize> = text.char_indices().map(|(index, _)| index).collect();
    let total_chars = char_byte_indices.len();
    let byte_at = |char_index: usize| -> usize {
        char_byte_indices
            .get(char_index)
            .copied()
            .unwrap_or(text.len())
    };

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < total_chars {
        let end = (start + max_chars).min(total_chars);
        let slice = &text[byte_at(start)..byte_at(end)];
        if !slice.trim().is_empty() {
            chunks.push(slice.to_string());
        }
        if end == total_chars {
            break;
        }
        // The next chunk re-reads the trailing overlap region.
        start = end - overlap_chars;
    }
    chunks
}
