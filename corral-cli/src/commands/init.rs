//! Init command implementation

use anyhow::{Context, Result};
use std::path::Path;

use corral_core::InitSpec;

use crate::engine::Engine;

pub async fn execute(engine: &Engine, spec: Option<&Path>) -> Result<()> {
    let spec: InitSpec = match spec {
        Some(path) => super::read_json(path)?,
        None => InitSpec::default(),
    };

    tracing::info!(overrides = spec.hierarchies.len(), "Initializing machine");

    engine
        .registry()
        .init_machine(&spec)
        .await
        .context("Failed to initialize resource hierarchies")?;

    let resources: Vec<_> = engine.registry().resource_types().collect();
    println!("✅ Initialized {} resource hierarchies", resources.len());

    Ok(())
}
