//! Run one rebuild pass over the watched folder and print the report.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ragagent::embeddings::{Embedder, OpenAIEmbedder};
use ragagent::index::IndexStore;
use ragagent::{Config, IndexRebuilder, RetrieverGuard};

#[derive(Parser, Debug)]
#[command(name = "rebuild")]
#[command(about = "Index new and changed documents in the watched folder")]
struct Args {
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;
    ragagent::init_logging(&config.ragagent.log_level);

    let api_key = std::env::var(&config.embeddings.api_key_env).map_err(|_| {
        anyhow::anyhow!(
            "Environment variable {} not set. Set it in your .env file or as an environment variable.",
            config.embeddings.api_key_env
        )
    })?;
    let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::new(
        api_key,
        config.embeddings.model.clone(),
        config.embeddings.base_url.clone(),
        config.embeddings.batch_size,
        config.embeddings.max_retries,
    )?);

    let store = IndexStore::open(config.index_db_path()).await?;
    let rebuilder = IndexRebuilder::new(
        config.watch_folder(),
        store,
        Arc::new(RetrieverGuard::new()),
        embedder,
        config.chunking.clone(),
    );

    let report = rebuilder.rebuild().await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Rebuild complete ({:?})", report.mode);
        println!("  Generation:      {}", report.generation);
        println!("  Files scanned:   {}", report.files_scanned);
        println!("  Files changed:   {}", report.files_changed);
        println!("  Files failed:    {}", report.files_failed);
        println!("  Files removed:   {}", report.files_removed);
        println!("  Chunks embedded: {}", report.chunks_embedded);
        println!("  Chunks purged:   {}", report.chunks_purged);
    }
    Ok(())
}
