//! Ask the agent one question from the command line.

use anyhow::Result;
use clap::Parser;
use ragagent::{AppContext, Config};

#[derive(Parser, Debug)]
#[command(name = "chat")]
#[command(about = "Answer a question using the indexed documents and web search")]
struct Args {
    /// The question
    question: String,

    /// Skip the rebuild pass and answer from the last persisted index
    #[arg(long)]
    no_rebuild: bool,

    /// Print every message of the run, not only the answer
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;
    ragagent::init_logging(&config.ragagent.log_level);

    let ctx = AppContext::from_config(config).await?;
    if args.no_rebuild {
        ctx.rebuilder.restore().await?;
    } else {
        ctx.initialize().await;
    }

    let cancel = ctx.cancel.child_token();
    let outcome = ctx.agent.chat(&[], &args.question, &cancel).await?;

    if args.verbose {
        for message in &outcome.messages {
            println!("{}", serde_json::to_string(message)?);
        }
        println!("({} model turns)", outcome.turns);
    }
    println!("{}", outcome.answer);

    ctx.shutdown().await;
    Ok(())
}
