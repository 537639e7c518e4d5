use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

type CacheKey = (String, String);

/// Thread-safe LRU cache of query embeddings, keyed by model and query text.
///
/// Only queries go through here; chunk embeddings are stored in the index.
pub struct EmbeddingCache {
    cache: Mutex<LruCache<CacheKey, Arc<Vec<f32>>>>,
}

impl EmbeddingCache {
    /// Capacity 0 is treated as 1
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    // A poisoned lock only means another reader panicked mid-lookup; the map is still valid.
    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, Arc<Vec<f32>>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, model: &str, query: &str) -> Option<Arc<Vec<f32>>> {
        self.lock()
            .get(&(model.to_string(), query.to_string()))
            .cloned()
    }

    pub fn put(&self, model: &str, query: &str, embedding: Vec<f32>) -> Arc<Vec<f32>> {
        let embedding = Arc::new(embedding);
        self.lock()
            .put((model.to_string(), query.to_string()), Arc::clone(&embedding));
        embedding
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
