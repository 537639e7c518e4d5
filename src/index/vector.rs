use std::collections::HashSet;
use std::sync::Arc;

use crate::embeddings::Embedder;
use crate::error::{Result, RagagentError};
use crate::ingest::Chunk;

/// One indexed chunk and its embedding
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Search hit
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// In-memory vector index scored by cosine similarity.
///
/// Entries are shared behind `Arc`, so cloning an index to derive the next
/// generation copies pointers, not embeddings.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dimensions: Option<usize>,
    entries: Vec<Arc<IndexEntry>>,
    ids: HashSet<String>,
}

impl VectorIndex {
    /// A valid index with no entries
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reassemble an index from persisted entries, in their stored order.
    pub fn from_entries(entries: Vec<IndexEntry>) -> Result<Self> {
        let mut index = Self::empty();
        for entry in entries {
            index.push(entry)?;
        }
        Ok(index)
    }

    /// Embed every chunk and build a fresh index.
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<Self> {
        let mut index = Self::empty();
        index.add_chunks(chunks, embedder).await?;
        Ok(index)
    }

    /// Embed and append chunks, leaving existing entries untouched.
    ///
    /// Chunks whose id is already indexed are skipped, so re-adding an identical
    /// file version never duplicates it. All embeddings are computed before
    /// anything is inserted: on error the index is unchanged.
    /// Returns the number of chunks inserted.
    pub async fn add_chunks(&mut self, chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<usize> {
        let mut seen = HashSet::new();
        let fresh: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| !self.ids.contains(&c.chunk_id) && seen.insert(c.chunk_id.clone()))
            .collect();
        if fresh.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = fresh.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed_batch(texts).await?;
        if embeddings.len() != fresh.len() {
            return Err(RagagentError::Embedding(format!(
                "Expected {} embeddings, got {}",
                fresh.len(),
                embeddings.len()
            )));
        }

        let mut staged = self.clone();
        for (chunk, embedding) in fresh.into_iter().zip(embeddings) {
            staged.push(IndexEntry { chunk, embedding })?;
        }
        let inserted = staged.len() - self.len();
        *self = staged;
        Ok(inserted)
    }

    fn push(&mut self, entry: IndexEntry) -> Result<()> {
        let dims = entry.embedding.len();
        if dims == 0 {
            return Err(RagagentError::Embedding(format!(
                "Empty embedding for chunk {}",
                entry.chunk.chunk_id
            )));
        }
        match self.dimensions {
            Some(expected) if expected != dims => {
                return Err(RagagentError::Index(format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    expected, dims
                )));
            }
            Some(_) => {}
            None => self.dimensions = Some(dims),
        }
        if self.ids.insert(entry.chunk.chunk_id.clone()) {
            self.entries.push(Arc::new(entry));
        }
        Ok(())
    }

    /// Drop every entry belonging to one of `paths`. Returns how many were removed.
    pub fn remove_paths(&mut self, paths: &HashSet<&str>) -> usize {
        if paths.is_empty() {
            return 0;
        }
        let before = self.entries.len();
        self.entries.retain(|e| !paths.contains(e.chunk.doc_path.as_str()));
        self.ids = self.entries.iter().map(|e| e.chunk.chunk_id.clone()).collect();
        if self.entries.is_empty() {
            self.dimensions = None;
        }
        before - self.entries.len()
    }

    /// Top `k` chunks by cosine similarity to `query_vec`, best first.
    /// Ties keep insertion order.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(dims) = self.dimensions {
            if query_vec.len() != dims {
                return Err(RagagentError::Index(format!(
                    "Query dimension mismatch: index has {}, query has {}",
                    dims,
                    query_vec.len()
                )));
            }
        }

        let mut scored: Vec<(f32, &Arc<IndexEntry>)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(query_vec, &e.embedding), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, e)| ScoredChunk {
                chunk: e.chunk.clone(),
                score,
            })
            .collect())
    }

    /// Embed `text` and return the `k` nearest chunks.
    pub async fn query(&self, text: &str, k: usize, embedder: &dyn Embedder) -> Result<Vec<Chunk>> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = embedder.embed(text).await?;
        Ok(self
            .search(&query_vec, k)?
            .into_iter()
            .map(|hit| hit.chunk)
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter().map(|e| e.as_ref())
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    pub fn contains_chunk(&self, chunk_id: &str) -> bool {
        self.ids.contains(chunk_id)
    }
}

/// Cosine similarity; 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
