//! corral CLI
//!
//! Drives the per-resource handler layer directly: one handler per resource
//! type per container, aggregated by a small engine.

use clap::Parser;
use std::process;
use tracing::Level;

mod cli;
mod commands;
mod engine;

use cli::Cli;
use engine::Engine;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // stdout carries JSON output
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match Engine::from_options(cli.root.as_deref(), cli.config.as_deref()) {
        Ok(engine) => commands::dispatch(&engine, cli.command).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {e:#}");
        process::exit(1);
    }
}
