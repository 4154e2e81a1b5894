//! Container engine stand-in
//!
//! Holds one handler per resource type for a container and fans operations
//! out to them. This is the only place results of several handlers are
//! combined.

use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use corral_cgroup::{CgroupConfig, CgroupFs};
use corral_core::{
    ContainerName, ContainerSpec, ContainerStats, ErrorKind, ResourceType, StatsType, ThreadId,
    UpdatePolicy,
};
use corral_handler::{FactoryRegistry, ResourceHandler};

/// Entry point shared by every command
pub struct Engine {
    registry: Arc<FactoryRegistry>,
}

impl Engine {
    /// Build the registry over the cgroup filesystem
    pub fn from_options(root: Option<&Path>, config: Option<&Path>) -> Result<Self> {
        let mut config = match config {
            Some(path) => CgroupConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => CgroupConfig::default(),
        };
        if let Some(root) = root {
            config = config.with_root(root);
        }

        debug!(root = %config.root.display(), "Using cgroup root");

        let backend = Arc::new(CgroupFs::new(config.clone()));
        Ok(Self::new(FactoryRegistry::with_backend(backend, &config)))
    }

    /// Wrap an existing registry
    pub fn new(registry: FactoryRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// The registry
    pub fn registry(&self) -> &FactoryRegistry {
        &self.registry
    }

    /// Create every resource for a new container
    ///
    /// On failure the resources already created are destroyed again.
    pub async fn create(&self, name: &ContainerName, spec: &ContainerSpec) -> Result<Container> {
        let mut container = Container {
            name: name.clone(),
            handlers: BTreeMap::new(),
        };

        for factory in self.registry.factories() {
            let resource = factory.resource_type();
            match factory.create(name, spec).await {
                Ok(handler) => {
                    container.handlers.insert(resource, handler);
                }
                Err(e) => {
                    if let Err(cleanup) = container.destroy().await {
                        warn!(container = %name, error = %cleanup, "Rollback incomplete");
                    }
                    return Err(e).with_context(|| format!("Failed to create {resource} for {name}"));
                }
            }
        }

        Ok(container)
    }

    /// Attach to every resource an existing container has
    pub async fn attach(&self, name: &ContainerName) -> Result<Container> {
        let mut handlers = BTreeMap::new();

        for factory in self.registry.factories() {
            match factory.get(name).await {
                Ok(handler) => {
                    handlers.insert(factory.resource_type(), handler);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(container = %name, resource = %factory.resource_type(), "No state");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if handlers.is_empty() {
            bail!("Container {name} does not exist");
        }

        Ok(Container {
            name: name.clone(),
            handlers,
        })
    }
}

/// Handlers of one container
pub struct Container {
    name: ContainerName,
    handlers: BTreeMap<ResourceType, Box<dyn ResourceHandler>>,
}

impl Container {
    /// Container name
    pub const fn name(&self) -> &ContainerName {
        &self.name
    }

    /// Resources this container has
    pub fn resources(&self) -> Vec<ResourceType> {
        self.handlers.keys().copied().collect()
    }

    /// Handler for one resource
    pub fn handler_mut(&mut self, resource: ResourceType) -> Result<&mut Box<dyn ResourceHandler>> {
        let name = &self.name;
        self.handlers
            .get_mut(&resource)
            .with_context(|| format!("Container {name} has no {resource} state"))
    }

    /// Update every resource; all are attempted, the first error is returned
    pub async fn update(&mut self, spec: &ContainerSpec, policy: UpdatePolicy) -> Result<()> {
        let mut first_error = None;

        for (resource, handler) in &mut self.handlers {
            if let Err(e) = handler.update(spec, policy).await {
                warn!(container = %self.name, %resource, error = %e, "Update failed");
                if first_error.is_none() {
                    first_error =
                        Some(anyhow::Error::new(e).context(format!("Failed to update {resource}")));
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Aggregate live spec
    pub async fn spec(&self) -> Result<ContainerSpec> {
        let mut spec = ContainerSpec::default();
        for (resource, handler) in &self.handlers {
            handler
                .spec(&mut spec)
                .await
                .with_context(|| format!("Failed to read {resource} spec"))?;
        }
        Ok(spec)
    }

    /// Aggregate statistics
    pub async fn stats(&self, stats_type: StatsType) -> Result<ContainerStats> {
        let mut stats = ContainerStats::default();
        for (resource, handler) in &self.handlers {
            handler
                .stats(stats_type, &mut stats)
                .await
                .with_context(|| format!("Failed to read {resource} stats"))?;
        }
        Ok(stats)
    }

    /// Move threads into every resource
    pub async fn enter(&self, tids: &[ThreadId]) -> Result<()> {
        for (resource, handler) in &self.handlers {
            handler
                .enter(tids)
                .await
                .with_context(|| format!("Failed to enter {resource}"))?;
        }
        Ok(())
    }

    /// Destroy every resource
    ///
    /// Destroyed handlers are dropped; handlers that fail stay in the
    /// container so the call can be retried.
    pub async fn destroy(&mut self) -> Result<()> {
        let mut failed = Vec::new();

        // children of other hierarchies do not matter, order is free
        for resource in self.resources().into_iter().rev() {
            let Some(mut handler) = self.handlers.remove(&resource) else {
                continue;
            };
            if let Err(e) = handler.destroy().await {
                warn!(container = %self.name, %resource, error = %e, "Destroy failed");
                failed.push(format!("{resource}: {e}"));
                self.handlers.insert(resource, handler);
            }
        }

        if !failed.is_empty() {
            bail!("Failed to destroy {}: {}", self.name, failed.join("; "));
        }
        Ok(())
    }
}
