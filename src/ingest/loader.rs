//! Turn raw file bytes into normalized text documents.
//!
//! Text and markdown load as one document. PDFs go through `pdf-extract`
//! and yield one document per page.

use std::collections::BTreeMap;

use crate::error::{Result, RagagentError};

/// Loader-assigned document kind, derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Markdown,
    Pdf,
}

impl DocumentKind {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "txt" => Some(Self::Text),
            "md" => Some(Self::Markdown),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Pdf => "pdf",
        }
    }
}

/// A normalized text document, tagged with its source path and digest
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: String,
    pub content: String,
    pub digest: String,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    fn new(path: &str, content: String, digest: &str, kind: DocumentKind) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), path.to_string());
        metadata.insert("hash".to_string(), digest.to_string());
        metadata.insert("doc_type".to_string(), kind.as_str().to_string());
        Self {
            path: path.to_string(),
            content,
            digest: digest.to_string(),
            metadata,
        }
    }
}

/// Load documents from bytes already read from disk.
///
/// `digest` must be the digest of exactly these bytes, so the chunks produced
/// downstream are tagged with the version of the file they came from.
/// Returns `Ok(vec![])` for unsupported extensions.
pub fn load_from_bytes(
    path: &str,
    extension: &str,
    bytes: &[u8],
    digest: &str,
) -> Result<Vec<Document>> {
    let kind = match DocumentKind::from_extension(extension) {
        Some(kind) => kind,
        None => {
            log::debug!("Skipping unsupported file type: {}", path);
            return Ok(Vec::new());
        }
    };

    match kind {
        DocumentKind::Text | DocumentKind::Markdown => {
            let content = std::str::from_utf8(bytes)
                .map_err(|e| load_error(path, format!("not valid UTF-8: {}", e)))?;
            Ok(vec![Document::new(path, normalize_text(content), digest, kind)])
        }
        DocumentKind::Pdf => {
            let pages = extract_pdf_pages(path, bytes)?;
            Ok(pages
                .into_iter()
                .enumerate()
                .filter(|(_, text)| !text.trim().is_empty())
                .map(|(idx, text)| {
                    let mut doc = Document::new(path, text, digest, kind);
                    doc.metadata.insert("page".to_string(), (idx + 1).to_string());
                    doc
                })
                .collect())
        }
    }
}

/// Line endings to `\n`, strip a leading BOM.
fn normalize_text(content: &str) -> String {
    content
        .strip_prefix('\u{feff}')
        .unwrap_or(content)
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

fn extract_pdf_pages(path: &str, bytes: &[u8]) -> Result<Vec<String>> {
    // pdf-extract can panic on malformed input; treat that as a load failure for this file.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| load_error(path, "PDF extraction panicked".to_string()))?
        .map_err(|e| load_error(path, format!("PDF extraction failed: {}", e)))?;

    Ok(pages.iter().map(|page| normalize_text(page)).collect())
}

fn load_error(path: &str, reason: String) -> RagagentError {
    RagagentError::Load {
        path: path.to_string(),
        reason,
    }
}
