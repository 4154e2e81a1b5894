use crate::cli::Commands;
use crate::engine::Engine;
use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

use corral_core::ContainerName;

pub mod create;
pub mod destroy;
pub mod enter;
pub mod init;
pub mod spec;
pub mod stats;
pub mod update;
pub mod watch;

/// Dispatch command to appropriate handler
pub async fn dispatch(engine: &Engine, command: Commands) -> Result<()> {
    match command {
        Commands::Init { spec } => init::execute(engine, spec.as_deref()).await,

        Commands::Create { name, spec } => create::execute(engine, &name, spec.as_deref()).await,

        Commands::Update {
            name,
            spec,
            replace,
        } => update::execute(engine, &name, &spec, replace).await,

        Commands::Spec { name } => spec::execute(engine, &name).await,

        Commands::Stats { name, full } => stats::execute(engine, &name, full).await,

        Commands::Enter { name, tids } => enter::execute(engine, &name, &tids).await,

        Commands::Destroy { name } => destroy::execute(engine, &name).await,

        Commands::Watch {
            name,
            resource,
            event,
            count,
        } => watch::execute(engine, &name, &resource, &event, count).await,
    }
}

fn container_name(name: &str) -> Result<ContainerName> {
    ContainerName::new(name).context("Invalid container name")
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
