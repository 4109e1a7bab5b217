//! Outpost CLI - Local instance manager for deployable agent binaries

#![cfg_attr(test, allow(clippy::expect_used))]

use clap::Parser;

use outpost_cli::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = cli.run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
