//! MitreLens CLI: threat-intel enrichment from the terminal.
//!
//! Narrates generated logs, runs the automate workflow, checks file and
//! domain reputation, and hosts a search-grounded chat.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
