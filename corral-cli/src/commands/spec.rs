//! Spec command implementation

use anyhow::Result;

use crate::engine::Engine;

pub async fn execute(engine: &Engine, name: &str) -> Result<()> {
    let name = super::container_name(name)?;
    let container = engine.attach(&name).await?;

    super::print_json(&container.spec().await?)
}
