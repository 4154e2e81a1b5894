//! Destroy command implementation

use anyhow::{Context, Result};

use crate::engine::Engine;

pub async fn execute(engine: &Engine, name: &str) -> Result<()> {
    tracing::info!(container = name, "Destroying container");

    let name = super::container_name(name)?;

    let mut container = engine
        .attach(&name)
        .await
        .context("Failed to access container (does it exist?)")?;

    container.destroy().await?;

    println!("✅ Container '{name}' destroyed");

    Ok(())
}
