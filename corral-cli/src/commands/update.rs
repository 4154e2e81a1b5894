//! Update command implementation

use anyhow::Result;
use std::path::Path;

use corral_core::{ContainerSpec, UpdatePolicy};

use crate::engine::Engine;

pub async fn execute(engine: &Engine, name: &str, spec: &Path, replace: bool) -> Result<()> {
    let name = super::container_name(name)?;
    let spec: ContainerSpec = super::read_json(spec)?;
    let policy = if replace {
        UpdatePolicy::Replace
    } else {
        UpdatePolicy::Diff
    };

    tracing::info!(container = %name, ?policy, "Updating container");

    let mut container = engine.attach(&name).await?;
    container.update(&spec, policy).await?;

    println!("✅ Container '{name}' updated");

    Ok(())
}
