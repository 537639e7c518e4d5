pub mod walker;
pub mod ledger;
pub mod loader;
pub mod chunker;

pub use walker::{FileMetadata, discover_files, INDEXED_EXTENSIONS};
pub use ledger::{HashLedger, compute_file_hash, digest_bytes};
pub use loader::{Document, DocumentKind, load_from_bytes};
pub use chunker::{Chunk, split_documents, split_text};

/// Read a discovered file's bytes; failures are per-file `Load` errors.
pub fn read_file(file: &FileMetadata) -> crate::error::Result<Vec<u8>> {
    std::fs::read(&file.absolute_path).map_err(|e| crate::error::RagagentError::Load {
        path: file.relative_path.clone(),
        reason: e.to_string(),
    })
}
