//! buildtail CLI: follow a CI build log and reduce it for failure analysis.
//!
//! Polls the build-log API into a file until the build finishes or a marker
//! appears, then optionally trims the log down to the relevant step windows.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
