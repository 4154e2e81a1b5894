//! Watch command implementation

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;
use tokio::sync::mpsc;

use corral_core::{EventSpec, ResourceType};

use crate::engine::Engine;

pub async fn execute(
    engine: &Engine,
    name: &str,
    resource: &str,
    event: &Path,
    count: Option<usize>,
) -> Result<()> {
    let name = super::container_name(name)?;
    let resource: ResourceType = resource.parse().context("Invalid resource type")?;
    let spec: EventSpec = super::read_json(event)?;
    let kind = spec.kind().context("Invalid event spec")?;

    let mut container = engine.attach(&name).await?;
    let handler = container.handler_mut(resource)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = handler
        .register_notification(
            &spec,
            Box::new(move |delivery| {
                // receiver gone means we are shutting down
                let _ = tx.send(delivery);
            }),
        )
        .await
        .with_context(|| format!("Failed to watch {kind} on {resource}"))?;

    tracing::info!(container = %name, %resource, event = %kind, notification = %id, "Watching");

    let mut seen = 0usize;
    loop {
        tokio::select! {
            delivery = rx.recv() => {
                let Some(delivery) = delivery else { break };
                seen += 1;

                let line = match &delivery {
                    Ok(()) => json!({
                        "container": name.as_str(),
                        "resource": resource,
                        "event": kind.to_string(),
                        "seq": seen,
                    }),
                    Err(e) => json!({
                        "container": name.as_str(),
                        "resource": resource,
                        "event": kind.to_string(),
                        "seq": seen,
                        "error": e.to_string(),
                    }),
                };
                println!("{line}");

                if delivery.is_err() || count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    // the poller may already have stopped after an edge event or an error
    if let Err(e) = handler.unregister_notification(id).await {
        tracing::debug!(notification = %id, error = %e, "Unregister skipped");
    }

    Ok(())
}
