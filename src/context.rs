//! Service object built once at startup and shared by every entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::config::Config;
use crate::embeddings::{Embedder, OpenAIEmbedder};
use crate::index::IndexStore;
use crate::llm::{ChatModel, OpenAIChat};
use crate::rebuild::{IndexRebuilder, RebuildHandle, RebuildWorker};
use crate::retriever::{Retriever, RetrieverGuard};
use crate::tools::{RetrieveDocumentsTool, SearchProvider, TavilySearch, ToolRegistry, WebSearchTool};

/// External services the core depends on
pub struct Services {
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
    pub search: Option<Arc<dyn SearchProvider>>,
}

impl Services {
    /// OpenAI embeddings and chat, plus Tavily search when its key is set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let embeddings_key = api_key(&config.embeddings.api_key_env)?;
        let embedder = OpenAIEmbedder::new(
            embeddings_key,
            config.embeddings.model.clone(),
            config.embeddings.base_url.clone(),
            config.embeddings.batch_size,
            config.embeddings.max_retries,
        )?;

        let chat_key = api_key(&config.chat.api_key_env)?;
        let chat = OpenAIChat::new(
            chat_key,
            config.chat.model.clone(),
            config.chat.base_url.clone(),
            config.chat.temperature,
            config.chat.max_retries,
            Duration::from_secs(config.chat.timeout_secs),
        )?;

        let search: Option<Arc<dyn SearchProvider>> = match config.web_search_api_key() {
            Some(key) if config.web_search.provider == "tavily" => Some(Arc::new(TavilySearch::new(
                key,
                config.web_search.max_results,
                config.web_search.include_answer,
            )?)),
            Some(_) => {
                log::warn!(
                    "Unsupported web_search.provider '{}'; web search disabled",
                    config.web_search.provider
                );
                None
            }
            None => {
                log::warn!(
                    "{} not set; web search disabled",
                    config.web_search.api_key_env
                );
                None
            }
        };

        Ok(Self {
            embedder: Arc::new(embedder),
            chat: Arc::new(chat),
            search,
        })
    }
}

fn api_key(env_name: &str) -> Result<String> {
    std::env::var(env_name).with_context(|| {
        format!(
            "Environment variable {} not set. Set it in your .env file or as an environment variable.",
            env_name
        )
    })
}

/// Wiring of guard, rebuilder, worker, tools and agent
pub struct AppContext {
    pub config: Config,
    pub guard: Arc<RetrieverGuard>,
    pub rebuilder: Arc<IndexRebuilder>,
    pub rebuild: RebuildHandle,
    pub agent: Arc<Agent>,
    pub cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl AppContext {
    pub async fn from_config(config: Config) -> Result<Self> {
        let services = Services::from_config(&config)?;
        Self::with_services(config, services).await
    }

    /// Build the context around the given services and spawn the rebuild worker.
    pub async fn with_services(config: Config, services: Services) -> Result<Self> {
        let store = IndexStore::open(config.index_db_path())
            .await
            .with_context(|| format!("Failed to open index store {}", config.index_db_path().display()))?;

        let guard = Arc::new(RetrieverGuard::new());
        let rebuilder = Arc::new(IndexRebuilder::new(
            config.watch_folder(),
            store,
            guard.clone(),
            services.embedder.clone(),
            config.chunking.clone(),
        ));

        let retriever = Arc::new(Retriever::new(
            guard.clone(),
            services.embedder,
            config.retrieval.k,
            config.embeddings.cache_capacity,
        ));
        let web_search = match services.search {
            Some(provider) => WebSearchTool::new(provider),
            None => WebSearchTool::unconfigured(),
        };
        let tools = ToolRegistry::new()
            .with(Arc::new(RetrieveDocumentsTool::new(retriever)))?
            .with(Arc::new(web_search))?;

        let agent = Arc::new(Agent::new(
            services.chat,
            Arc::new(tools),
            config.chat.max_turns,
            Duration::from_secs(config.chat.timeout_secs),
        ));

        let cancel = CancellationToken::new();
        let (rebuild, worker) = RebuildWorker::spawn(
            rebuilder.clone(),
            Duration::from_millis(config.rebuild.debounce_ms),
            cancel.child_token(),
        );

        Ok(Self {
            config,
            guard,
            rebuilder,
            rebuild,
            agent,
            cancel,
            worker,
        })
    }

    /// Restore the last generation, then run one rebuild pass.
    ///
    /// A failed pass is logged and leaves whatever was restored (possibly
    /// nothing) in service.
    pub async fn initialize(&self) {
        match self.rebuilder.restore().await {
            Ok(Some(generation)) => log::info!("Serving restored generation {}", generation),
            Ok(None) => log::info!("No persisted index yet"),
            Err(e) => log::error!("Failed to restore persisted index: {}", e),
        }

        match self.rebuild.request("startup").wait().await {
            Ok(report) => log::info!(
                "Initial build ready: generation {} ({} files)",
                report.generation,
                report.files_scanned
            ),
            Err(e) => log::error!("Initial build failed: {}", e),
        }
    }

    /// Stop the rebuild worker, letting an in-flight pass observe cancellation.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.worker.await {
            log::error!("Rebuild worker panicked: {}", e);
        }
    }
}
