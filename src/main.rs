use std::sync::Arc;

use anyhow::Result;
use ragagent::{AppContext, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    ragagent::init_logging(&config.ragagent.log_level);
    log::info!("Starting RagAgent v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Watched folder: {}", config.watch_folder().display());
    log::info!("Index store: {}", config.index_db_path().display());

    let ctx = Arc::new(AppContext::from_config(config).await?);
    ctx.initialize().await;

    let shutdown = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Shutting down");
            shutdown.cancel();
        }
    });

    ragagent::http::serve(ctx.clone()).await?;

    if let Ok(ctx) = Arc::try_unwrap(ctx) {
        ctx.shutdown().await;
    }
    Ok(())
}
