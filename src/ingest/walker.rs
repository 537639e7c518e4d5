use walkdir::WalkDir;
use std::path::{Path, PathBuf};
use crate::error::{Result, RagagentError};

/// Extensions the index understands. Everything else in the folder is ignored.
pub const INDEXED_EXTENSIONS: &[&str] = &["txt", "md", "pdf"];

/// Metadata for a discovered file
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Path relative to the watched folder, always with `/` separators
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub extension: String,
    pub file_size: u64,
}

/// Lowercased extension of `path`, or "" when it has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
}

pub fn is_indexed_extension(extension: &str) -> bool {
    INDEXED_EXTENSIONS.contains(&extension)
}

/// Discover all indexable files under the watched folder.
///
/// Recursively walks the tree and keeps `.txt`, `.md` and `.pdf` files
/// (case-insensitive). Results are sorted by relative path so a pass over an
/// unchanged folder always visits files in the same order.
pub fn discover_files(root: &Path) -> Result<Vec<FileMetadata>> {
    let mut files = Vec::new();

    if !root.exists() {
        log::warn!("Watched folder {} does not exist", root.display());
        return Ok(files);
    }

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        let path = entry.path();

        if !entry.file_type().is_file() {
            continue;
        }

        let extension = extension_of(path);
        if !is_indexed_extension(&extension) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let relative_path = path
            .strip_prefix(root)
            .map_err(|_| {
                RagagentError::Config(format!(
                    "Failed to compute relative path for: {}",
                    path.display()
                ))
            })?
            .to_string_lossy()
            .replace('\\', "/");

        files.push(FileMetadata {
            relative_path,
            absolute_path: path.to_path_buf(),
            extension,
            file_size: metadata.len(),
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    log::debug!("Discovered {} files in {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use std::fs;

    #[test]
    fn test_discover_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("Guides/api")).unwrap();
        fs::write(root.join("notes.txt"), "plain text note").unwrap();
        fs::write(root.join("README.MD"), "# Docs").unwrap();
        fs::write(root.join("report.pdf"), b"%PDF-1.4").unwrap();
        fs::write(root.join("Guides/api/endpoints.md"), "# API endpoints").unwrap();
        fs::write(root.join("image.png"), b"\x89PNG\r\n\x1a\n").unwrap();
        fs::write(root.join("slides.pptx"), b"PK").unwrap();

        let files = discover_files(root).unwrap();

        let paths: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["Guides/api/endpoints.md", "README.MD", "notes.txt", "report.pdf"]
        );
        assert_eq!(files[1].extension, "md");
    }

    #[test]
    fn test_discover_files_empty() {
        let temp_dir = TempDir::new().unwrap();
        let files = discover_files(temp_dir.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_discover_files_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let files = discover_files(&temp_dir.path().join("absent")).unwrap();
        assert!(files.is_empty());
    }
}
