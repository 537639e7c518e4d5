use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use super::loader::Document;

/// A span of document text; the unit stored in and returned from the vector index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Stable id derived from (path, digest, position)
    pub chunk_id: String,
    pub text: String,
    pub doc_path: String,
    pub doc_digest: String,
    /// Order of this chunk among all chunks of the same file version
    pub position: usize,
}

impl Chunk {
    pub fn new(text: String, doc_path: &str, doc_digest: &str, position: usize) -> Self {
        Self {
            chunk_id: chunk_id(doc_path, doc_digest, position),
            text,
            doc_path: doc_path.to_string(),
            doc_digest: doc_digest.to_string(),
            position,
        }
    }
}

pub fn chunk_id(doc_path: &str, doc_digest: &str, position: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(doc_path.as_bytes());
    hasher.update([0u8]);
    hasher.update(doc_digest.as_bytes());
    hasher.update([0u8]);
    hasher.update(position.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Split documents into overlapping chunks.
///
/// Chunks never span two documents. Positions count up across all documents
/// sharing a path (e.g. the pages of one PDF), in input order.
pub fn split_documents(documents: &[Document], config: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current_path: Option<&str> = None;
    let mut position = 0usize;

    for doc in documents {
        if current_path != Some(doc.path.as_str()) {
            current_path = Some(doc.path.as_str());
            position = 0;
        }
        for text in split_text(&doc.content, config.chunk_size, config.chunk_overlap) {
            chunks.push(Chunk::new(text, &doc.path, &doc.digest, position));
            position += 1;
        }
    }

    chunks
}

/// Split text into chunks of at most `size` characters, with roughly `overlap`
/// characters repeated between neighbours.
///
/// Cuts prefer a paragraph break, then a line break, then any whitespace, searched
/// in the back half of the window. The next chunk starts at a word boundary
/// inside the last `overlap` characters of the previous one.
pub fn split_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let size = size.max(1);
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    // byte offset of every char index, plus the end
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        while start < n && chars[start].is_whitespace() {
            start += 1;
        }
        if start >= n {
            break;
        }

        let window_end = (start + size).min(n);
        let end = if window_end < n {
            find_break(&chars, start + size / 2, window_end).unwrap_or(window_end)
        } else {
            window_end
        };

        let piece = text[offsets[start]..offsets[end]].trim_end();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if end >= n {
            break;
        }

        let overlap_start = end.saturating_sub(overlap).max(start + 1);
        start = if overlap_start >= end {
            end
        } else {
            word_start_after(&chars, overlap_start, end).unwrap_or(overlap_start)
        };
    }

    chunks
}

/// Best cut index in `[lo, hi]` (the chunk is `[.., cut)`), by separator priority.
fn find_break(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    let lo = lo.max(1);
    let candidates = || (lo..=hi).rev().filter(|&i| i < chars.len());

    candidates()
        .find(|&i| chars[i] == '\n' && chars.get(i + 1) == Some(&'\n'))
        .or_else(|| candidates().find(|&i| chars[i] == '\n'))
        .or_else(|| candidates().find(|&i| chars[i].is_whitespace()))
}

/// First index in `[from, before)` that begins a word.
fn word_start_after(chars: &[char], from: usize, before: usize) -> Option<usize> {
    (from..before)
        .find(|&i| i + 1 < before && chars[i].is_whitespace() && !chars[i + 1].is_whitespace())
        .map(|i| i + 1)
}
