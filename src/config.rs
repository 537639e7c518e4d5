use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ragagent: RagagentConfig,
    pub embeddings: EmbeddingsConfig,
    pub chat: ChatConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub rebuild: RebuildConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Folder locations
#[derive(Debug, Clone, Deserialize)]
pub struct RagagentConfig {
    /// Folder whose txt/md/pdf files are indexed. Uploads land here.
    pub watch_folder: PathBuf,
    /// Directory holding `index.db` (vector index + hash ledger).
    pub index_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Embeddings configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: usize,
}

/// Language model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub model: String,
    pub api_key_env: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Maximum number of model turns before the agent gives up
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Deadline for a single model call
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_chat_retries")]
    pub max_retries: usize,
}

/// Retrieval tool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

/// What an incremental rebuild does with chunks of changed or deleted files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StaleChunkPolicy {
    /// Leave old chunks in place (they may surface in results until a full rebuild)
    #[default]
    Keep,
    /// Remove every chunk of a changed or deleted path before inserting the new ones
    Purge,
}

/// Chunking configuration (sizes in characters)
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default)]
    pub stale_chunks: StaleChunkPolicy,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            stale_chunks: StaleChunkPolicy::default(),
        }
    }
}

/// Web search provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default = "default_search_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_search_max_results")]
    pub max_results: usize,
    #[serde(default = "default_true")]
    pub include_answer: bool,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            api_key_env: default_search_api_key_env(),
            max_results: default_search_max_results(),
            include_answer: true,
        }
    }
}

/// Background rebuild worker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RebuildConfig {
    /// Requests arriving within this window are coalesced into one pass
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            allowed_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_embedding_retries() -> usize {
    3
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_turns() -> usize {
    8
}

fn default_chat_timeout_secs() -> u64 {
    60
}

fn default_chat_retries() -> usize {
    2
}

fn default_k() -> usize {
    4
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_search_provider() -> String {
    "tavily".to_string()
}

fn default_search_api_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}

fn default_search_max_results() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_http_port() -> u16 {
    5000
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RAGAGENT_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RAGAGENT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::from_file(&config_path)
    }

    /// Parse and validate a specific config file
    pub fn from_file(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validation (no filesystem or environment checks)
    pub fn from_toml(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).context("Failed to parse config.toml")
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.ragagent.watch_folder.exists() && !self.ragagent.watch_folder.is_dir() {
            anyhow::bail!(
                "watch_folder must be a directory, not a file: {}",
                self.ragagent.watch_folder.display()
            );
        }
        std::fs::create_dir_all(&self.ragagent.watch_folder).with_context(|| {
            format!(
                "Failed to create watch_folder: {}",
                self.ragagent.watch_folder.display()
            )
        })?;

        if self.embeddings.provider != "openai" {
            anyhow::bail!(
                "Unsupported embeddings.provider '{}' (expected 'openai')",
                self.embeddings.provider
            );
        }

        for env_name in [&self.embeddings.api_key_env, &self.chat.api_key_env] {
            std::env::var(env_name).with_context(|| {
                format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                    env_name
                )
            })?;
        }

        if self.retrieval.k == 0 {
            anyhow::bail!("retrieval.k must be greater than 0");
        }

        if self.chat.max_turns == 0 {
            anyhow::bail!("chat.max_turns must be greater than 0");
        }

        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be greater than 0");
        }

        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!("chunking.chunk_overlap must be less than chunk_size");
        }

        Ok(())
    }

    /// Folder watched for documents
    pub fn watch_folder(&self) -> &Path {
        &self.ragagent.watch_folder
    }

    /// Location of the SQLite file holding index and ledger
    pub fn index_db_path(&self) -> PathBuf {
        self.ragagent.index_dir.join("index.db")
    }

    /// Web search API key, if configured
    pub fn web_search_api_key(&self) -> Option<String> {
        std::env::var(&self.web_search.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn create_test_config(temp_dir: &TempDir) -> String {
        let root = temp_dir.path().to_str().unwrap().replace('\\', "\\\\");
        format!(
            r#"
[ragagent]
watch_folder = "{root}/uploads"
index_dir = "{root}/rag_index"
log_level = "debug"

[embeddings]
provider = "openai"
model = "text-embedding-3-small"
api_key_env = "RAGAGENT_TEST_OPENAI_KEY"
batch_size = 64

[chat]
model = "gpt-4o"
api_key_env = "RAGAGENT_TEST_OPENAI_KEY"
max_turns = 5

[chunking]
chunk_size = 500
chunk_overlap = 50
stale_chunks = "purge"
"#
        )
    }

    fn with_env(key: Option<&str>, f: impl FnOnce()) {
        let original = std::env::var("RAGAGENT_TEST_OPENAI_KEY").ok();
        match key {
            Some(k) => std::env::set_var("RAGAGENT_TEST_OPENAI_KEY", k),
            None => std::env::remove_var("RAGAGENT_TEST_OPENAI_KEY"),
        }
        f();
        std::env::remove_var("RAGAGENT_TEST_OPENAI_KEY");
        if let Some(val) = original {
            std::env::set_var("RAGAGENT_TEST_OPENAI_KEY", val);
        }
    }

    #[test]
    fn test_config_from_file_success() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, create_test_config(&temp_dir)).unwrap();

        with_env(Some("test-key"), || {
            let config = Config::from_file(&config_path);
            assert!(config.is_ok(), "from_file failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.ragagent.log_level, "debug");
            assert_eq!(config.embeddings.batch_size, 64);
            assert_eq!(config.chat.max_turns, 5);
            assert_eq!(config.chunking.stale_chunks, StaleChunkPolicy::Purge);
            assert!(config.watch_folder().is_dir(), "watch_folder should be created");
        });
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_toml(
            r#"
[ragagent]
watch_folder = "uploads"
index_dir = "rag_index"

[embeddings]
provider = "openai"
model = "text-embedding-3-small"
api_key_env = "OPENAI_API_KEY"

[chat]
model = "gpt-4o"
api_key_env = "OPENAI_API_KEY"
"#,
        )
        .unwrap();
        assert_eq!(config.retrieval.k, 4);
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.chunking.stale_chunks, StaleChunkPolicy::Keep);
        assert_eq!(config.web_search.max_results, 5);
        assert_eq!(config.http_server.port, 5000);
        assert_eq!(config.http_server.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(config.index_db_path(), PathBuf::from("rag_index").join("index.db"));
        assert!((config.chat.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_missing_api_key() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, create_test_config(&temp_dir)).unwrap();

        with_env(None, || {
            let err = Config::from_file(&config_path).unwrap_err();
            assert!(err.to_string().contains("RAGAGENT_TEST_OPENAI_KEY"));
        });
    }

    #[test]
    fn test_config_rejects_overlap_not_smaller_than_size() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let content = create_test_config(&temp_dir).replace("chunk_overlap = 50", "chunk_overlap = 500");
        fs::write(&config_path, content).unwrap();

        with_env(Some("test-key"), || {
            let err = Config::from_file(&config_path).unwrap_err();
            assert!(err.to_string().contains("chunk_overlap"));
        });
    }

    #[test]
    fn test_config_invalid_path() {
        let config = Config::from_file(Path::new("nonexistent-ragagent.toml"));
        assert!(config.is_err());
    }
}
