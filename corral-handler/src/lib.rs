//! Resource handler layer for corral
//!
//! A container's state is partitioned by [`ResourceType`](corral_core::ResourceType).
//! For each type one process-wide [`ResourceHandlerFactory`] creates and
//! locates [`ResourceHandler`]s, one per container. Handlers apply spec
//! sections, report statistics, move threads and deliver event
//! notifications. The [`FactoryRegistry`] maps every type to its factory.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use corral_cgroup::{CgroupConfig, MockBackend};
//! use corral_core::{
//!     ContainerName, ContainerSpec, InitSpec, Limit, MemorySize, MemorySpec, ResourceType,
//! };
//! use corral_handler::{FactoryRegistry, ResourceHandler, ResourceHandlerFactory};
//!
//! # #[tokio::main]
//! # async fn main() -> corral_core::Result<()> {
//! let registry = FactoryRegistry::with_backend(Arc::new(MockBackend::new()), &CgroupConfig::default());
//! registry.init_machine(&InitSpec::default()).await?;
//!
//! let spec = ContainerSpec {
//!     memory: Some(MemorySpec {
//!         limit: Some(Limit::Value(MemorySize::from_mb(256))),
//!         ..Default::default()
//!     }),
//!     ..Default::default()
//! };
//! let name = ContainerName::new("/job")?;
//! let mut memory = registry.factory(ResourceType::Memory)?.create(&name, &spec).await?;
//!
//! let mut live = ContainerSpec::default();
//! memory.spec(&mut live).await?;
//! assert_eq!(live.memory.unwrap().limit, Some(Limit::Value(MemorySize::from_mb(256))));
//!
//! memory.destroy().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cgroup;
pub mod handler;
pub mod notify;
pub mod parse;
pub mod registry;
pub mod resource;
pub mod resources;

pub use cgroup::{CgroupHandler, CgroupHandlerFactory};
pub use handler::{HandlerState, NotificationCallback, ResourceHandler, ResourceHandlerFactory};
pub use notify::{NotificationTable, Probe};
pub use registry::{FactoryRegistry, FactoryRegistryBuilder};
pub use resource::{Group, Knob, Resource};
pub use resources::{
    CpuHandlerFactory, CpuResource, DiskIoHandlerFactory, DiskIoResource, GlobalHandlerFactory,
    GlobalResource, MemoryHandlerFactory, MemoryResource, MonitoringHandlerFactory,
    MonitoringResource, NetworkHandlerFactory, NetworkResource,
};
