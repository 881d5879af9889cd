#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{GraftError, Result};

/// Parameters controlling how a document is split into nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkParams {
    /// Maximum chunk size in bytes
    pub chunk_size: usize,
    /// Bytes shared between consecutive chunks
    pub overlap: usize,
}

impl Default for ChunkParams {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 20,
        }
    }
}

impl ChunkParams {
    /// Check that the parameters describe a valid splitting scheme
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(GraftError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(GraftError::Config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A chunk of a source document, the unit of indexing and retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique id for this node
    pub id: String,
    /// Identifier of the document this node was cut from
    pub source_id: String,
    /// Byte offset of the first byte of `text` in the source document
    pub start: usize,
    /// Byte offset one past the last byte of `text` in the source document
    pub end: usize,
    /// The chunk text
    pub text: String,
    /// The chunk_size parameter used to produce this node
    pub chunk_size: usize,
    /// The overlap parameter used to produce this node
    pub overlap: usize,
}

/// Split `text` into overlapping nodes of at most `params.chunk_size` bytes.
///
/// Consecutive nodes share `params.overlap` bytes (a few more when the cut
/// would otherwise land inside a multi-byte character). Concatenating each
/// node's non-overlapping prefix reconstructs the source exactly, and the
/// boundaries are deterministic for a given input and parameter set. Cut
/// points prefer sentence ends over hard truncation where one exists late
/// enough in the window.
///
/// Empty input produces zero nodes.
#[inline]
pub fn chunk(text: &str, source_id: &str, params: &ChunkParams) -> Result<Vec<Node>> {
    params.validate()?;

    let len = text.len();
    let mut nodes = Vec::new();
    let mut start = 0;

    while start < len {
        let end = pick_cut(text, start, params);
        nodes.push(Node {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            start,
            end,
            text: text[start..end].to_string(),
            chunk_size: params.chunk_size,
            overlap: params.overlap,
        });

        if end >= len {
            break;
        }
        // The next node starts `overlap` bytes before this one ended, floored
        // to a character boundary so the shared region is never split mid-char.
        // The cut can land below `overlap` when a wide character forced it
        // back, so the subtraction must saturate.
        let next = floor_char_boundary(text, end.saturating_sub(params.overlap));
        // Flooring across a wide character must not stall the walk.
        start = if next > start { next } else { end };
    }

    debug!(
        "Chunked {} bytes from '{}' into {} nodes (chunk_size={}, overlap={})",
        len,
        source_id,
        nodes.len(),
        params.chunk_size,
        params.overlap
    );

    Ok(nodes)
}

/// Choose where the node starting at `start` should end.
///
/// The hard limit is `start + chunk_size` (capped at the document end). When
/// the limit falls short of the document end, prefer the last sentence
/// terminator inside the window, as long as cutting there still advances past
/// the overlap region. Otherwise fall back to the hard limit.
fn pick_cut(text: &str, start: usize, params: &ChunkParams) -> usize {
    let len = text.len();
    let mut hard_end = floor_char_boundary(text, (start + params.chunk_size).min(len));
    if hard_end <= start {
        // chunk_size smaller than the character at `start`; take one char
        hard_end = ceil_char_boundary(text, start + 1);
    }
    if hard_end >= len {
        return len;
    }

    // A cut at `end` is only usable if the non-overlapping prefix
    // [start, end - overlap) is non-empty, otherwise we stop advancing.
    let min_cut = start + params.overlap + 1;

    let window = &text[start..hard_end];
    let mut best: Option<usize> = None;
    for (i, c) in window.char_indices() {
        if matches!(c, '.' | '!' | '?' | '\n') {
            let cut = start + i + c.len_utf8();
            if cut >= min_cut {
                best = Some(cut);
            }
        }
    }

    best.unwrap_or(hard_end)
}

/// Largest index `<= i` that is a character boundary of `s`
fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest index `>= i` that is a character boundary of `s`
fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i.min(s.len())
}
