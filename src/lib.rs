pub mod config;
pub mod error;
pub mod db;
pub mod retry;
pub mod ingest;
pub mod embeddings;
pub mod index;
pub mod retriever;
pub mod rebuild;
pub mod llm;
pub mod tools;
pub mod agent;
pub mod context;
pub mod http;
pub mod watch;

pub use config::Config;
pub use context::{AppContext, Services};
pub use error::{RagagentError, Result};
pub use rebuild::{IndexRebuilder, RebuildMode, RebuildReport};
pub use retriever::{Retriever, RetrieverGuard};

/// Initialise env_logger. `RUST_LOG` wins over `default_level`.
pub fn init_logging(default_level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", default_level))
        .try_init();
}
