//! Index rebuild: diff the watched folder against the hash ledger, embed only
//! what changed, then persist and commit the result as one generation.

pub mod worker;

pub use worker::{RebuildHandle, RebuildStatus, RebuildTicket, RebuildWorker};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::{ChunkingConfig, StaleChunkPolicy};
use crate::embeddings::Embedder;
use crate::error::{Result, RagagentError};
use crate::index::{IndexStore, VectorIndex};
use crate::ingest::{
    digest_bytes, discover_files, load_from_bytes, read_file, split_documents, Document, HashLedger,
};
use crate::retriever::RetrieverGuard;

/// How a pass changed the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildMode {
    /// No prior index: everything was embedded
    Full,
    /// Changed files were added to the existing index
    Incremental,
    /// Nothing changed on disk
    Unchanged,
}

/// Outcome of one successful rebuild pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub mode: RebuildMode,
    pub files_scanned: usize,
    pub files_changed: usize,
    pub files_failed: usize,
    pub files_removed: usize,
    pub chunks_embedded: usize,
    pub chunks_purged: usize,
    pub generation: u64,
}

/// Files of one pass sorted into what needs embedding and what does not.
#[derive(Debug, Default)]
struct FolderScan {
    next_ledger: HashLedger,
    documents: Vec<Document>,
    changed_paths: Vec<String>,
    files_scanned: usize,
    files_failed: usize,
}

/// Drives loader, chunker and vector index for the watched folder.
///
/// Passes are serialized by an internal lock, so the ledger read at the start
/// of a pass is always the one written by the previous pass.
pub struct IndexRebuilder {
    watch_folder: PathBuf,
    store: IndexStore,
    guard: Arc<RetrieverGuard>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    pass_lock: Mutex<()>,
}

impl IndexRebuilder {
    pub fn new(
        watch_folder: impl Into<PathBuf>,
        store: IndexStore,
        guard: Arc<RetrieverGuard>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            watch_folder: watch_folder.into(),
            store,
            guard,
            embedder,
            chunking,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn watch_folder(&self) -> &Path {
        &self.watch_folder
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn guard(&self) -> &Arc<RetrieverGuard> {
        &self.guard
    }

    /// Load the last persisted generation into the guard, if there is one.
    /// Returns its generation number.
    pub async fn restore(&self) -> Result<Option<u64>> {
        let _pass = self.pass_lock.lock().await;
        match self.store.restore().await? {
            Some((index, info)) => {
                log::info!(
                    "Restored index generation {} ({} chunks)",
                    info.number,
                    info.chunk_count
                );
                self.guard.commit(Arc::new(index), info.number);
                Ok(Some(info.number))
            }
            None => Ok(None),
        }
    }

    /// Run one rebuild pass over the watched folder.
    ///
    /// Per-file read or extraction failures skip that file; the file keeps its
    /// previous ledger entry so the next pass retries it. Any embedding or
    /// persistence failure aborts the pass before anything is committed.
    pub async fn rebuild(&self) -> Result<RebuildReport> {
        let _pass = self.pass_lock.lock().await;
        let start = std::time::Instant::now();

        let ledger = self.store.load_ledger().await?;
        let base = match self.guard.current() {
            Ok(snapshot) => Some(snapshot.index),
            Err(RagagentError::NotInitialized) => {
                self.store.restore().await?.map(|(index, _)| Arc::new(index))
            }
            Err(e) => return Err(e),
        };
        let full = base.is_none();

        log::info!(
            "Starting {} rebuild of {}",
            if full { "full" } else { "incremental" },
            self.watch_folder.display()
        );

        let root = self.watch_folder.clone();
        let previous = ledger.clone();
        let scan = tokio::task::spawn_blocking(move || scan_folder(&root, &previous, full))
            .await
            .map_err(|e| RagagentError::RebuildFailed(format!("scan task join: {}", e)))??;

        let removed: Vec<String> = ledger
            .removed_since(&scan.next_ledger)
            .map(str::to_string)
            .collect();
        let chunks = split_documents(&scan.documents, &self.chunking);

        let mut chunks_purged = 0;
        let (mode, index, chunks_embedded) = match base {
            None => {
                let index = VectorIndex::build(chunks, self.embedder.as_ref()).await?;
                let embedded = index.len();
                (RebuildMode::Full, Arc::new(index), embedded)
            }
            Some(base) if !scan.changed_paths.is_empty() || !removed.is_empty() => {
                let mut index = (*base).clone();
                if self.chunking.stale_chunks == StaleChunkPolicy::Purge {
                    let stale: HashSet<&str> = scan
                        .changed_paths
                        .iter()
                        .chain(removed.iter())
                        .map(String::as_str)
                        .collect();
                    chunks_purged = index.remove_paths(&stale);
                }
                let embedded = index.add_chunks(chunks, self.embedder.as_ref()).await?;
                (RebuildMode::Incremental, Arc::new(index), embedded)
            }
            Some(base) => (RebuildMode::Unchanged, base, 0),
        };

        let info = self.store.persist(&index, &scan.next_ledger).await?;
        self.guard.commit(index, info.number);

        let report = RebuildReport {
            mode,
            files_scanned: scan.files_scanned,
            files_changed: scan.changed_paths.len(),
            files_failed: scan.files_failed,
            files_removed: removed.len(),
            chunks_embedded,
            chunks_purged,
            generation: info.number,
        };
        log::info!(
            "Rebuild finished in {:?}: mode={:?} scanned={} changed={} failed={} removed={} embedded={} purged={} generation={}",
            start.elapsed(),
            report.mode,
            report.files_scanned,
            report.files_changed,
            report.files_failed,
            report.files_removed,
            report.chunks_embedded,
            report.chunks_purged,
            report.generation
        );
        Ok(report)
    }
}

/// Read and digest every indexable file, loading the ones that changed.
///
/// With `full` set every readable file counts as changed.
fn scan_folder(root: &Path, ledger: &HashLedger, full: bool) -> Result<FolderScan> {
    let files = discover_files(root)?;
    let mut scan = FolderScan {
        files_scanned: files.len(),
        ..FolderScan::default()
    };

    for file in &files {
        let path = file.relative_path.as_str();
        let loaded = read_file(file).and_then(|bytes| {
            let digest = digest_bytes(&bytes);
            if !full && ledger.matches(path, &digest) {
                return Ok((digest, None));
            }
            let documents = load_from_bytes(path, &file.extension, &bytes, &digest)?;
            Ok((digest, Some(documents)))
        });

        match loaded {
            Ok((digest, None)) => scan.next_ledger.insert(path, digest),
            Ok((digest, Some(documents))) => {
                scan.next_ledger.insert(path, digest);
                scan.changed_paths.push(path.to_string());
                scan.documents.extend(documents);
            }
            Err(e) if e.is_per_file() => {
                log::warn!("Skipping {}: {}", path, e);
                scan.files_failed += 1;
                if let Some(old) = ledger.get(path) {
                    scan.next_ledger.insert(path, old);
                }
            }
            Err(e) => return Err(e),
        }
    }

    Ok(scan)
}
