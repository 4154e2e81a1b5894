//! Partitioned observed-state documents
//!
//! Same partition rule as [`ContainerSpec`](crate::ContainerSpec): each
//! handler fills only its own section.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::{MemorySize, ThreadId};

/// Aggregate per-container statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStats {
    /// CPU section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuStats>,
    /// Memory section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryStats>,
    /// Block I/O section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diskio: Option<DiskIoStats>,
    /// Network section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkStats>,
    /// Monitoring section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<MonitoringStats>,
    /// Container-wide section
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalStats>,
}

/// CPU usage from `cpu.stat`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuStats {
    /// Total CPU time used
    #[serde(with = "duration_micros")]
    pub usage: Duration,
    /// Time spent throttled (hit CPU limit)
    #[serde(with = "duration_micros")]
    pub throttled: Duration,
    /// User time (full only)
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_duration_micros")]
    pub user: Option<Duration>,
    /// System time (full only)
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_duration_micros")]
    pub system: Option<Duration>,
    /// Enforcement periods elapsed (full only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periods: Option<u64>,
    /// Periods in which the group was throttled (full only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttled_periods: Option<u64>,
}

/// Memory usage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Current usage
    pub usage: MemorySize,
    /// Peak usage, when the kernel reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak: Option<MemorySize>,
    /// Current swap usage (full only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_usage: Option<MemorySize>,
    /// Anonymous memory (full only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anon: Option<MemorySize>,
    /// Page cache (full only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<MemorySize>,
    /// OOM kills inside the group (full only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oom_kills: Option<u64>,
}

/// Block I/O totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskIoStats {
    /// Bytes read across all devices
    pub read_bytes: u64,
    /// Bytes written across all devices
    pub write_bytes: u64,
    /// Per-device breakdown (full only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceIoStats>,
}

/// One `io.stat` line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIoStats {
    /// Device major number
    pub major: u32,
    /// Device minor number
    pub minor: u32,
    /// Bytes read
    pub read_bytes: u64,
    /// Bytes written
    pub write_bytes: u64,
    /// Read operations
    pub read_ios: u64,
    /// Write operations
    pub write_ios: u64,
}

/// Network classification state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Class id in effect
    pub class_id: u32,
    /// Non-zero interface priorities (full only)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub priorities: BTreeMap<String, u32>,
}

/// Pressure stall information per resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStats {
    /// `cpu.pressure`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Pressure>,
    /// `memory.pressure`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Pressure>,
    /// `io.pressure`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io: Option<Pressure>,
}

/// One PSI file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pressure {
    /// Share of time at least one task stalled
    pub some: PressureLine,
    /// Share of time all tasks stalled (full only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full: Option<PressureLine>,
}

/// `avg10=.. avg60=.. avg300=.. total=..`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PressureLine {
    /// 10 second average, percent
    pub avg10: f64,
    /// 60 second average, percent
    pub avg60: f64,
    /// 300 second average, percent
    pub avg300: f64,
    /// Total stall time in microseconds
    pub total_us: u64,
}

/// Container-wide state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStats {
    /// Tasks currently in the group
    pub tasks: u64,
    /// Whether any task is in the group or its descendants
    pub populated: bool,
    /// Whether the group is frozen
    pub frozen: bool,
    /// Threads in the group (full only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub threads: Vec<ThreadId>,
}

// cpu.stat reports microseconds; keep that precision on the wire
mod duration_micros {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_micros() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = u64::deserialize(deserializer)?;
        Ok(Duration::from_micros(micros))
    }
}

mod opt_duration_micros {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::cast_possible_truncation, clippy::ref_option)]
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_micros() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_micros))
    }
}
