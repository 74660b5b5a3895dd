//! Paragraph-boundary splitter for long corpus texts.
//!
//! Long-form reference chapters are far larger than anything the context
//! assembler can use, so they are split into chunks before embedding. Each
//! chunk becomes its own [`DocumentRecord`] sharing the parent's title,
//! category and source group, with a stable id `<parent-id>#<n>`.
//!
//! # Algorithm
//!
//! 1. `max_chars = max_tokens × 4`.
//! 2. Split on blank lines (`\n\n`), accumulating paragraphs while the
//!    buffer stays within `max_chars`.
//! 3. A paragraph longer than `max_chars` is hard-split at the last newline
//!    or space before the limit (falling back to a char boundary).
//! 4. Texts that fit in one chunk keep the parent id unchanged.

use sha2::{Digest, Sha256};

use crate::models::DocumentRecord;

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// A piece of text cut from a parent record.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// Split `text` into paragraph-bounded chunks of at most `max_tokens × 4` bytes.
///
/// Empty or whitespace-only text yields no chunks.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens.max(1) * CHARS_PER_TOKEN;
    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        let would_be = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };
        if would_be > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if para.len() > max_chars {
            pieces.extend(hard_split(para, max_chars));
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(para);
        }
    }
    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            index,
            hash: content_hash(&text),
            text,
        })
        .collect()
}

/// A record produced by [`chunk_record`], with the hash of its text.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkedRecord {
    pub record: DocumentRecord,
    /// SHA-256 of `record.text`, hex encoded.
    pub hash: String,
}

/// Expand a record into one record per chunk.
///
/// Records whose text fits in a single chunk are returned as-is (same id);
/// records with empty text produce nothing.
pub fn chunk_record(record: &DocumentRecord, max_tokens: usize) -> Vec<ChunkedRecord> {
    let chunks = chunk_text(&record.text, max_tokens);
    let single = chunks.len() <= 1;

    chunks
        .into_iter()
        .map(|c| {
            let id = if single {
                record.id.clone()
            } else {
                format!("{}#{}", record.id, c.index)
            };
            ChunkedRecord {
                record: DocumentRecord {
                    id,
                    title: record.title.clone(),
                    text: c.text,
                    category: record.category.clone(),
                    source_group: record.source_group,
                },
                hash: c.hash,
            }
        })
        .collect()
}

/// Hex SHA-256 of a string.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn hard_split(para: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut remaining = para;

    while !remaining.is_empty() {
        if remaining.len() <= max_chars {
            out.push(remaining.trim().to_string());
            break;
        }
        let limit = snap_to_char_boundary(remaining, max_chars);
        let cut = remaining[..limit]
            .rfind('\n')
            .or_else(|| remaining[..limit].rfind(' '))
            .map(|pos| pos + 1)
            .unwrap_or(limit);
        let cut = if cut == 0 {
            next_char_boundary(remaining)
        } else {
            cut
        };

        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[cut..];
    }

    out.retain(|p| !p.is_empty());
    out
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

fn next_char_boundary(s: &str) -> usize {
    s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
}
