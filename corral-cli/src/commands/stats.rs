//! Stats command implementation

use anyhow::Result;

use corral_core::StatsType;

use crate::engine::Engine;

pub async fn execute(engine: &Engine, name: &str, full: bool) -> Result<()> {
    tracing::info!(container = name, full, "Getting stats");

    let name = super::container_name(name)?;
    let stats_type = if full {
        StatsType::Full
    } else {
        StatsType::Summary
    };

    let container = engine.attach(&name).await?;

    super::print_json(&container.stats(stats_type).await?)
}
