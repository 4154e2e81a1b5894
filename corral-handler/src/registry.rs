//! Process-wide factory registry
//!
//! Built once at startup and never mutated afterwards, so lookups need no
//! locking. Share it as `Arc<FactoryRegistry>`.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use corral_cgroup::{CgroupConfig, GroupBackend};
use corral_core::{Error, InitSpec, ResourceType, Result};

use crate::handler::ResourceHandlerFactory;
use crate::resources::{
    CpuHandlerFactory, DiskIoHandlerFactory, GlobalHandlerFactory, MemoryHandlerFactory,
    MonitoringHandlerFactory, NetworkHandlerFactory,
};

/// Immutable table of one factory per resource type
pub struct FactoryRegistry {
    factories: BTreeMap<ResourceType, Arc<dyn ResourceHandlerFactory>>,
}

impl FactoryRegistry {
    /// Start building a registry
    #[must_use]
    pub fn builder() -> FactoryRegistryBuilder {
        FactoryRegistryBuilder::default()
    }

    /// Registry with all six resource types served by `backend`
    #[must_use]
    pub fn with_backend(backend: Arc<dyn GroupBackend>, config: &CgroupConfig) -> Self {
        let interval = config.poll_interval;
        let factories: [Arc<dyn ResourceHandlerFactory>; 6] = [
            Arc::new(CpuHandlerFactory::new(Arc::clone(&backend), interval)),
            Arc::new(MemoryHandlerFactory::new(Arc::clone(&backend), interval)),
            Arc::new(DiskIoHandlerFactory::new(Arc::clone(&backend), interval)),
            Arc::new(NetworkHandlerFactory::new(Arc::clone(&backend), interval)),
            Arc::new(MonitoringHandlerFactory::new(Arc::clone(&backend), interval)),
            Arc::new(GlobalHandlerFactory::new(backend, interval)),
        ];

        Self {
            factories: factories
                .into_iter()
                .map(|f| (f.resource_type(), f))
                .collect(),
        }
    }

    /// Factory serving `resource`
    ///
    /// # Errors
    /// `NotFound` if no factory was registered for it
    pub fn factory(&self, resource: ResourceType) -> Result<&Arc<dyn ResourceHandlerFactory>> {
        self.factories
            .get(&resource)
            .ok_or_else(|| Error::not_found(format!("no factory registered for {resource}")))
    }

    /// Registered resource types in order
    pub fn resource_types(&self) -> impl Iterator<Item = ResourceType> + '_ {
        self.factories.keys().copied()
    }

    /// Iterate over every factory
    pub fn factories(&self) -> impl Iterator<Item = &Arc<dyn ResourceHandlerFactory>> {
        self.factories.values()
    }

    /// Run machine bootstrap on every factory, stopping at the first error
    pub async fn init_machine(&self, spec: &InitSpec) -> Result<()> {
        for factory in self.factories.values() {
            factory
                .init_machine(spec)
                .await
                .map_err(|e| e.context(format!("init {}", factory.resource_type())))?;
        }

        info!(resources = self.factories.len(), "Machine initialized");

        Ok(())
    }
}

impl std::fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("resources", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`FactoryRegistry`]
#[derive(Default)]
pub struct FactoryRegistryBuilder {
    factories: BTreeMap<ResourceType, Arc<dyn ResourceHandlerFactory>>,
}

impl std::fmt::Debug for FactoryRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryRegistryBuilder")
            .field("resources", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FactoryRegistryBuilder {
    /// Add a factory
    ///
    /// # Errors
    /// `AlreadyExists` if its resource type is already registered
    pub fn register(mut self, factory: Arc<dyn ResourceHandlerFactory>) -> Result<Self> {
        let resource = factory.resource_type();
        if self.factories.contains_key(&resource) {
            return Err(Error::already_exists(format!(
                "factory for {resource} already registered"
            )));
        }
        self.factories.insert(resource, factory);
        Ok(self)
    }

    /// Freeze the registry
    #[must_use]
    pub fn build(self) -> FactoryRegistry {
        FactoryRegistry {
            factories: self.factories,
        }
    }
}
