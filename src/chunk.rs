//! Character-window text chunker with overlap.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_chars` characters.
//! Each window prefers to end at a paragraph break, then a line break, then
//! a space; the next window starts `overlap_chars` characters before the
//! previous split so neighbouring chunks share context.
//!
//! Each chunk gets a random UUID plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Split `text` into overlapping chunks. Returns at least one chunk, with
/// contiguous indices starting at 0.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    chunk_chars: usize,
    overlap_chars: usize,
) -> Vec<Chunk> {
    let chunk_chars = chunk_chars.max(1);
    let overlap_chars = overlap_chars.min(chunk_chars - 1);
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    let mut chunks = Vec::new();
    let mut chunk_index: i64 = 0;
    let mut start = 0usize;

    while start < total {
        let hard_end = (start + chunk_chars).min(total);
        let end = if hard_end < total {
            find_split(&chars, start, hard_end)
        } else {
            hard_end
        };

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(make_chunk(document_id, chunk_index, piece));
            chunk_index += 1;
        }

        if end >= total {
            break;
        }
        // Always advance, even when the overlap would reach back past `start`.
        start = end.saturating_sub(overlap_chars).max(start + 1);
    }

    // Guarantee at least one chunk
    if chunks.is_empty() {
        chunks.push(make_chunk(document_id, 0, text.trim()));
    }

    chunks
}

/// Best split position in `(start, hard_end]`. Splits closer than half a
/// window to `start` are ignored so chunks don't degenerate.
fn find_split(chars: &[char], start: usize, hard_end: usize) -> usize {
    let min_end = start + (hard_end - start) / 2;

    let paragraph = (min_end + 1..hard_end)
        .rev()
        .find(|&i| chars[i] == '\n' && chars[i - 1] == '\n');
    if let Some(i) = paragraph {
        return i + 1;
    }

    for sep in ['\n', ' '] {
        if let Some(i) = (min_end..hard_end).rev().find(|&i| chars[i] == sep) {
            return i + 1;
        }
    }

    hard_end
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
