//! lookbook-rs - Lookbook API session client
//!
//! Logs in, keeps the session fresh and sends authenticated requests.
//!
//! Available as the `lookbook` and `lb` commands.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lookbook_rs::cli::commands::{Cli, Commands};
use lookbook_rs::cli::{auth, config, request};
use lookbook_rs::error::{LookbookError, RefreshError, Result};

#[tokio::main]
async fn main() {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        handle_error(e);
        std::process::exit(1);
    }
}

/// Print an error, adding a hint when the server refused the refresh token
fn handle_error(e: LookbookError) {
    eprintln!("Error: {}", e);

    if let LookbookError::Refresh(RefreshError::Rejected { .. }) = &e {
        eprintln!();
        eprintln!("  → Run 'lookbook auth login' to sign in again.");
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Auth(args) => auth::handle_auth(args.command).await,
        Commands::Request(args) => request::handle_request(args).await,
        Commands::Config(args) => config::handle_config(args.command),
    }
}
