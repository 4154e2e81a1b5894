//! Partitioned container configuration documents
//!
//! A [`ContainerSpec`] has one optional section per [`ResourceType`]. Every
//! field inside a section is optional too, so a sparse spec can say "change
//! only this" under [`UpdatePolicy::Diff`](crate::UpdatePolicy::Diff).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::{CpuCores, Limit, MemorySize, ResourceType};

/// Behaviour shared by every spec section
pub trait SpecSection: Clone + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Fill every absent field with its default value
    fn fill_defaults(&mut self);

    /// Consume and return the fully populated section
    #[must_use]
    fn with_defaults(mut self) -> Self {
        self.fill_defaults();
        self
    }
}

/// Aggregate per-container configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerSpec {
    /// CPU section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuSpec>,
    /// Memory section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemorySpec>,
    /// Block I/O section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diskio: Option<DiskIoSpec>,
    /// Network section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkSpec>,
    /// Monitoring section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<MonitoringSpec>,
    /// Container-wide section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalSpec>,
}

impl ContainerSpec {
    /// Resource types that have a section in this spec
    #[must_use]
    pub fn present(&self) -> Vec<ResourceType> {
        ResourceType::ALL
            .into_iter()
            .filter(|t| match t {
                ResourceType::Cpu => self.cpu.is_some(),
                ResourceType::Memory => self.memory.is_some(),
                ResourceType::DiskIo => self.diskio.is_some(),
                ResourceType::Network => self.network.is_some(),
                ResourceType::Monitoring => self.monitoring.is_some(),
                ResourceType::Global => self.global.is_some(),
            })
            .collect()
    }
}

/// CPU bandwidth (`cpu.max`) and proportional weight (`cpu.weight`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CpuSpec {
    /// Bandwidth limit in cores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Limit<CpuCores>>,
    /// Relative weight, 1..=10000
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u64>,
}

impl CpuSpec {
    /// Kernel default `cpu.weight`
    pub const DEFAULT_WEIGHT: u64 = 100;
}

impl SpecSection for CpuSpec {
    fn fill_defaults(&mut self) {
        self.limit.get_or_insert(Limit::Max);
        self.weight.get_or_insert(Self::DEFAULT_WEIGHT);
    }
}

/// Memory limit, reservation and swap limit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemorySpec {
    /// Hard limit (`memory.max`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Limit<MemorySize>>,
    /// Best-effort protection (`memory.low`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation: Option<MemorySize>,
    /// Swap limit (`memory.swap.max`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_limit: Option<Limit<MemorySize>>,
}

impl SpecSection for MemorySpec {
    fn fill_defaults(&mut self) {
        self.limit.get_or_insert(Limit::Max);
        self.reservation.get_or_insert(MemorySize::default());
        self.swap_limit.get_or_insert(Limit::Max);
    }
}

/// Per-device bandwidth limit (`io.max`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceLimit {
    /// Device major number
    pub major: u32,
    /// Device minor number
    pub minor: u32,
    /// Read bytes per second
    pub read_bps: Limit<u64>,
    /// Write bytes per second
    pub write_bps: Limit<u64>,
}

impl DeviceLimit {
    /// A device entry with both directions unlimited
    #[must_use]
    pub const fn unlimited(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            read_bps: Limit::Max,
            write_bps: Limit::Max,
        }
    }

    /// `(major, minor)` key
    #[must_use]
    pub const fn device(&self) -> (u32, u32) {
        (self.major, self.minor)
    }
}

/// Block I/O weight and device limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiskIoSpec {
    /// Relative weight, 1..=10000 (`io.weight`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
    /// Bandwidth limits per device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_limits: Option<Vec<DeviceLimit>>,
}

impl DiskIoSpec {
    /// Kernel default `io.weight`
    pub const DEFAULT_WEIGHT: u16 = 100;
}

impl SpecSection for DiskIoSpec {
    fn fill_defaults(&mut self) {
        self.weight.get_or_insert(Self::DEFAULT_WEIGHT);
        self.device_limits.get_or_insert_with(Vec::new);
    }
}

/// Traffic classification (`net_cls`, `net_prio`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkSpec {
    /// Class id tagged on outgoing packets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
    /// Per-interface priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priorities: Option<BTreeMap<String, u32>>,
}

impl SpecSection for NetworkSpec {
    fn fill_defaults(&mut self) {
        self.class_id.get_or_insert(0);
        self.priorities.get_or_insert_with(BTreeMap::new);
    }
}

/// Monitoring knobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitoringSpec {
    /// Pressure stall accounting (`cgroup.pressure`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<bool>,
}

impl SpecSection for MonitoringSpec {
    fn fill_defaults(&mut self) {
        self.pressure.get_or_insert(true);
    }
}

/// Container-wide knobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSpec {
    /// Task limit (`pids.max`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tasks: Option<Limit<u64>>,
    /// Freezer state (`cgroup.freeze`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frozen: Option<bool>,
}

impl SpecSection for GlobalSpec {
    fn fill_defaults(&mut self) {
        self.max_tasks.get_or_insert(Limit::Max);
        self.frozen.get_or_insert(false);
    }
}

/// Machine bootstrap document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitSpec {
    /// Hierarchies to prepare; resources without an entry use their defaults
    #[serde(default)]
    pub hierarchies: Vec<HierarchySpec>,
}

impl InitSpec {
    /// The entry for `resource`, if any
    #[must_use]
    pub fn hierarchy(&self, resource: ResourceType) -> Option<&HierarchySpec> {
        self.hierarchies.iter().find(|h| h.resource == resource)
    }
}

/// One resource hierarchy to prepare at boot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HierarchySpec {
    /// Resource owning the hierarchy
    pub resource: ResourceType,
    /// Kernel controllers to enable in it
    pub controllers: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_spec_from_json() {
        let spec: ContainerSpec =
            serde_json::from_str(r#"{"memory": {"limit": {"value": 268435456}}}"#).unwrap();
        let memory = spec.memory.as_ref().unwrap();
        assert_eq!(memory.limit, Some(Limit::Value(MemorySize::from_mb(256))));
        assert!(memory.reservation.is_none());
        assert_eq!(spec.present(), [ResourceType::Memory]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<ContainerSpec>(r#"{"gpu": {}}"#).is_err());
        assert!(serde_json::from_str::<ContainerSpec>(r#"{"cpu": {"shares": 2}}"#).is_err());
    }

    #[test]
    fn defaults_fill_only_absent_fields() {
        let spec = MemorySpec {
            limit: Some(Limit::Value(MemorySize::from_mb(512))),
            ..Default::default()
        }
        .with_defaults();

        assert_eq!(spec.limit, Some(Limit::Value(MemorySize::from_mb(512))));
        assert_eq!(spec.reservation, Some(MemorySize::default()));
        assert_eq!(spec.swap_limit, Some(Limit::Max));
    }

    #[test]
    fn init_spec_lookup() {
        let spec = InitSpec {
            hierarchies: vec![HierarchySpec {
                resource: ResourceType::Memory,
                controllers: vec!["memory".to_string()],
            }],
        };
        assert!(spec.hierarchy(ResourceType::Memory).is_some());
        assert!(spec.hierarchy(ResourceType::Cpu).is_none());
    }
}
