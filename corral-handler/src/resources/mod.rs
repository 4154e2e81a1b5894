//! The six resource types

pub mod cpu;
pub mod diskio;
pub mod global;
pub mod memory;
pub mod monitoring;
pub mod network;

pub use cpu::CpuResource;
pub use diskio::DiskIoResource;
pub use global::GlobalResource;
pub use memory::MemoryResource;
pub use monitoring::MonitoringResource;
pub use network::NetworkResource;

use crate::cgroup::CgroupHandlerFactory;

/// Factory for CPU handlers
pub type CpuHandlerFactory = CgroupHandlerFactory<CpuResource>;
/// Factory for memory handlers
pub type MemoryHandlerFactory = CgroupHandlerFactory<MemoryResource>;
/// Factory for block I/O handlers
pub type DiskIoHandlerFactory = CgroupHandlerFactory<DiskIoResource>;
/// Factory for network handlers
pub type NetworkHandlerFactory = CgroupHandlerFactory<NetworkResource>;
/// Factory for monitoring handlers
pub type MonitoringHandlerFactory = CgroupHandlerFactory<MonitoringResource>;
/// Factory for container-wide handlers
pub type GlobalHandlerFactory = CgroupHandlerFactory<GlobalResource>;
