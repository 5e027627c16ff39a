mod mcp;
mod search;

use apprev_scraper::ReviewFetcher;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::search::SearchArgs;

const VERBOSE_FILTER: &str = "info,apprev_scraper=debug,apprev_cli=debug";

#[derive(Debug, Parser)]
#[command(name = "apprev")]
#[command(about = "Fetch, normalize and filter app store reviews")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch reviews for one or more apps and print them as JSON
    Search(SearchArgs),
    /// Serve the search_reviews tool over MCP on stdio
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = apprev_core::load_app_config()?;

    let verbose = matches!(&cli.command, Commands::Search(args) if args.verbose);
    init_tracing(&config.log_level, verbose)?;
    tracing::debug!(env = %config.env, "configuration loaded");

    let fetcher = ReviewFetcher::from_config(&config)?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    match cli.command {
        Commands::Search(args) => {
            search::run_search(&fetcher, &args, config.max_concurrent_fetches, &cancel).await
        }
        Commands::Serve => mcp::McpServer::new(fetcher, cancel).serve_stdio().await,
    }
}

/// Logs go to stderr; stdout carries JSON results and MCP frames.
fn init_tracing(log_level: &str, verbose: bool) -> anyhow::Result<()> {
    let env_filter = if verbose {
        EnvFilter::try_new(VERBOSE_FILTER)?
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            return;
        }
        tracing::info!("received ctrl-c, cancelling in-flight fetches");
        cancel.cancel();
    });
}
