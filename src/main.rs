//! html-play CLI
//!
//! Fetch a page (directly or through headless Chrome) and print what it contains.

use anyhow::Result;
use clap::{Parser, Subcommand};
use html_play::fetch::{run_fetch, FetchCommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "html-play")]
#[command(author = "RoyalBit Inc.")]
#[command(version)]
#[command(about = "Fetch a page and query it like a DOM")]
#[command(long_about = "Fetch a page and query it like a DOM.\n\nBackends:\n  --fetch     Plain HTTP request (default)\n  --browser   Render in headless Chrome first\n\nSet RUST_LOG=html_play=debug for tracing output.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve a URL and print its links, images or selected elements
    Fetch(FetchCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch(args) => run_fetch(args).await,
    }
}
