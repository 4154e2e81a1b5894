//! Enter command implementation

use anyhow::{Context, Result};

use corral_core::ThreadId;

use crate::engine::Engine;

pub async fn execute(engine: &Engine, name: &str, tids: &[String]) -> Result<()> {
    let name = super::container_name(name)?;
    let tids = tids
        .iter()
        .map(|raw| {
            raw.parse::<ThreadId>()
                .with_context(|| format!("Invalid thread id {raw:?}"))
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(container = %name, threads = tids.len(), "Entering container");

    let container = engine.attach(&name).await?;
    container.enter(&tids).await?;

    println!("✅ Moved {} threads into '{name}'", tids.len());

    Ok(())
}
