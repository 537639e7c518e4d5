//! Folder watcher: queue a rebuild when indexable files under the watched
//! folder are created, modified or removed.

mod watcher;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::ingest::walker::{extension_of, is_indexed_extension};
use crate::rebuild::RebuildHandle;

/// Whether a change to `path` can affect the index.
pub fn is_relevant(path: &Path) -> bool {
    is_indexed_extension(&extension_of(path))
}

/// Watch `root` until `cancel` fires, turning relevant changes into rebuild requests.
pub async fn run_watcher(
    root: PathBuf,
    rebuild: RebuildHandle,
    debounce: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let thread_root = root.clone();
    std::thread::spawn(move || {
        if let Err(e) = watcher::run_watcher_thread(&thread_root, debounce, tx) {
            log::error!("watcher thread error: {}", e);
        }
    });
    log::info!("Watching {} (debounce {:?})", root.display(), debounce);

    loop {
        let path = tokio::select! {
            _ = cancel.cancelled() => break,
            path = rx.recv() => match path {
                Some(path) => path,
                None => break,
            },
        };
        if !is_relevant(&path) {
            continue;
        }

        let shown = path.strip_prefix(&root).unwrap_or(&path).display().to_string();
        log::info!("watch: {} changed", shown);
        drop(rebuild.request(format!("watch {}", shown)));
    }
    Ok(())
}
