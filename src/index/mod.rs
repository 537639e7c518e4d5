pub mod vector;
pub mod store;

pub use vector::{cosine_similarity, IndexEntry, ScoredChunk, VectorIndex};
pub use store::{GenerationInfo, IndexStore};
