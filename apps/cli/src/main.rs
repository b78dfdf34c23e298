//! DataLive bootstrap CLI.
//!
//! Brings a freshly started automation platform to a usable state: owner
//! identity, session, license, the credential catalog and the workflow
//! definitions. Safe to run on every container start.

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
