use thiserror::Error;

/// Main error type for RagAgent
#[derive(Error, Debug)]
pub enum RagagentError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding API errors. Fatal for the rebuild pass that hit them.
    #[error("Embedding API error: {0}")]
    Embedding(String),

    /// Language model errors (unreachable service, malformed response)
    #[error("Language model error: {0}")]
    Llm(String),

    /// Web search provider errors
    #[error("Search error: {0}")]
    Search(String),

    /// Persisted ledger exists but cannot be trusted
    #[error("Ledger corrupt: {0}")]
    LedgerCorrupt(String),

    /// Vector index construction or restore errors
    #[error("Index error: {0}")]
    Index(String),

    /// No index has been committed yet
    #[error("Index not initialized")]
    NotInitialized,

    /// Per-file read or extraction failure
    #[error("Failed to load {path}: {reason}")]
    Load { path: String, reason: String },

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Tool name not present in the registry
    #[error("No tool named '{0}'")]
    ToolNotFound(String),

    /// An external call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The operation was cancelled by its caller
    #[error("Cancelled")]
    Cancelled,

    /// A rebuild pass failed; the previous generation stays active
    #[error("Rebuild failed: {0}")]
    RebuildFailed(String),
}

/// Convenient Result type using RagagentError
pub type Result<T> = std::result::Result<T, RagagentError>;

impl RagagentError {
    /// Whether this error came from reading or extracting a single file.
    pub fn is_per_file(&self) -> bool {
        matches!(self, RagagentError::Load { .. })
    }
}
