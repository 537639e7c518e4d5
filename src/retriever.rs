use std::sync::{Arc, RwLock};

use crate::embeddings::{Embedder, EmbeddingCache};
use crate::error::{Result, RagagentError};
use crate::index::VectorIndex;
use crate::ingest::Chunk;

/// A committed index together with the generation it was persisted as
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    pub index: Arc<VectorIndex>,
    pub generation: u64,
}

/// Single guarded reference to the active vector index.
///
/// The lock is held only to clone or replace the `Arc`; queries run on the
/// clone, so a rebuild swapping in a new generation never blocks readers for
/// longer than a pointer store.
#[derive(Debug, Default)]
pub struct RetrieverGuard {
    current: RwLock<Option<IndexSnapshot>>,
}

impl RetrieverGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest committed snapshot, or `NotInitialized` before the first commit.
    pub fn current(&self) -> Result<IndexSnapshot> {
        let slot = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.clone().ok_or(RagagentError::NotInitialized)
    }

    pub fn current_index(&self) -> Result<Arc<VectorIndex>> {
        Ok(self.current()?.index)
    }

    /// Atomically replace the active index.
    pub fn commit(&self, index: Arc<VectorIndex>, generation: u64) {
        let snapshot = IndexSnapshot { index, generation };
        let mut slot = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(snapshot);
        drop(slot);
        log::info!("Committed index generation {}", generation);
    }

    pub fn generation(&self) -> Option<u64> {
        self.current().ok().map(|s| s.generation)
    }

    pub fn is_initialized(&self) -> bool {
        self.current().is_ok()
    }
}

/// Query side of the index: embeds questions and searches the current generation.
pub struct Retriever {
    guard: Arc<RetrieverGuard>,
    embedder: Arc<dyn Embedder>,
    cache: Option<EmbeddingCache>,
    k: usize,
}

impl Retriever {
    /// `cache_capacity` of 0 disables the query-embedding cache.
    pub fn new(
        guard: Arc<RetrieverGuard>,
        embedder: Arc<dyn Embedder>,
        k: usize,
        cache_capacity: usize,
    ) -> Self {
        let cache = (cache_capacity > 0).then(|| EmbeddingCache::new(cache_capacity));
        Self {
            guard,
            embedder,
            cache,
            k,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn guard(&self) -> &Arc<RetrieverGuard> {
        &self.guard
    }

    /// Top `k` chunks for `query` from the active index.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Chunk>> {
        let snapshot = self.guard.current()?;
        if snapshot.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embed_query(query).await?;
        let hits = snapshot.index.search(&query_vec, self.k)?;
        log::debug!(
            "Retrieved {} chunks from generation {}",
            hits.len(),
            snapshot.generation
        );
        Ok(hits.into_iter().map(|h| h.chunk).collect())
    }

    async fn embed_query(&self, query: &str) -> Result<Arc<Vec<f32>>> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(self.embedder.model(), query) {
                log::debug!("Query embedding cache hit");
                return Ok(hit);
            }
        }

        let start = std::time::Instant::now();
        let embedding = self.embedder.embed(query).await?;
        log::debug!("Query embedding took {:?}", start.elapsed());

        Ok(match &self.cache {
            Some(cache) => cache.put(self.embedder.model(), query, embedding),
            None => Arc::new(embedding),
        })
    }
}
