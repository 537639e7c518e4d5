//! Watch the document folder and rebuild the index whenever it changes.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use ragagent::watch::run_watcher;
use ragagent::{AppContext, Config};

#[derive(Parser, Debug)]
#[command(name = "watch")]
#[command(about = "Watch the document folder and keep the index current")]
struct Args {
    /// Debounce delay in milliseconds before forwarding a file change
    #[arg(long, default_value = "500")]
    debounce_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;
    ragagent::init_logging(&config.ragagent.log_level);

    log::info!("Starting RagAgent file watcher");
    let root = config.watch_folder().to_path_buf();
    let ctx = AppContext::from_config(config).await?;
    ctx.initialize().await;

    let shutdown = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    log::info!("Watching for changes (Ctrl+C to stop)");
    run_watcher(
        root,
        ctx.rebuild.clone(),
        Duration::from_millis(args.debounce_ms),
        ctx.cancel.clone(),
    )
    .await?;

    ctx.shutdown().await;
    Ok(())
}
