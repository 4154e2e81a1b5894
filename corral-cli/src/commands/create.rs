//! Create command implementation

use anyhow::Result;
use std::path::Path;

use corral_core::ContainerSpec;

use crate::engine::Engine;

pub async fn execute(engine: &Engine, name: &str, spec: Option<&Path>) -> Result<()> {
    let name = super::container_name(name)?;
    let spec: ContainerSpec = match spec {
        Some(path) => super::read_json(path)?,
        None => ContainerSpec::default(),
    };

    tracing::info!(container = %name, sections = ?spec.present(), "Creating container");

    let container = engine.create(&name, &spec).await?;

    println!(
        "✅ Container '{}' created ({} resources)",
        container.name(),
        container.resources().len()
    );

    Ok(())
}
