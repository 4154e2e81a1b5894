//! corral Core - Shared vocabulary of the resource handler layer
//!
//! Resource categories, partitioned spec/stats documents, event requests and
//! the structured error type every handler operation returns.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod events;
pub mod resources;
pub mod spec;
pub mod stats;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use events::{
    ContainerEmptyEvent, EventKind, EventSpec, MemoryThresholdEvent, OomEvent, PressureEvent,
    PressureResource,
};
pub use resources::{CpuCores, Limit, MemorySize, ResourceType, StatsType, UpdatePolicy};
pub use spec::{
    ContainerSpec, CpuSpec, DeviceLimit, DiskIoSpec, GlobalSpec, HierarchySpec, InitSpec,
    MemorySpec, MonitoringSpec, NetworkSpec, SpecSection,
};
pub use stats::{
    ContainerStats, CpuStats, DeviceIoStats, DiskIoStats, GlobalStats, MemoryStats,
    MonitoringStats, NetworkStats, Pressure, PressureLine,
};
pub use types::{ContainerName, NotificationId, ThreadId};
