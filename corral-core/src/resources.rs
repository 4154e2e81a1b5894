//! Resource categories, update policies and value objects with unit safety

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// The closed set of resource categories a container is partitioned into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// CPU bandwidth and weight
    Cpu,
    /// Memory limits
    Memory,
    /// Block I/O
    #[serde(rename = "diskio")]
    DiskIo,
    /// Network classification
    Network,
    /// Pressure and usage monitoring
    Monitoring,
    /// Container-wide knobs (task limit, freezer)
    Global,
}

impl ResourceType {
    /// Every resource type, in registry order
    pub const ALL: [Self; 6] = [
        Self::Cpu,
        Self::Memory,
        Self::DiskIo,
        Self::Network,
        Self::Monitoring,
        Self::Global,
    ];

    /// Lowercase name used in logs, config and the CLI
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::DiskIo => "diskio",
            Self::Network => "network",
            Self::Monitoring => "monitoring",
            Self::Global => "global",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::invalid_argument(format!("unknown resource type {s:?}")))
    }
}

/// How a spec is reconciled against live state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    /// Apply only the fields present in the spec
    Diff,
    /// Make live state mirror the spec, resetting unmentioned fields
    Replace,
}

/// How much work a stats call may do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatsType {
    /// Cheap counters only
    #[default]
    Summary,
    /// Full, possibly expensive introspection
    Full,
}

/// A kernel limit that may be unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Limit<T> {
    /// No limit (`max` in cgroup files)
    Max,
    /// A concrete bound
    Value(T),
}

impl<T: fmt::Display> fmt::Display for Limit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => f.write_str("max"),
            Self::Value(v) => v.fmt(f),
        }
    }
}

/// Memory size value object with compile-time unit safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[repr(transparent)]
#[serde(transparent)]
pub struct MemorySize(u64); // bytes

impl MemorySize {
    /// Create from bytes
    #[must_use]
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Create from megabytes
    #[must_use]
    pub const fn from_mb(mb: u64) -> Self {
        Self(mb.saturating_mul(1024).saturating_mul(1024))
    }

    /// Get value in bytes
    #[must_use]
    pub const fn as_bytes(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MemorySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // cgroup files take raw byte counts
        write!(f, "{}", self.0)
    }
}

/// CPU cores value object
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct CpuCores(f64);

impl CpuCores {
    /// Default `cpu.max` period in microseconds
    pub const PERIOD_US: u64 = 100_000;

    /// Create new CPU cores value
    #[must_use]
    pub const fn new(cores: f64) -> Self {
        Self(cores)
    }

    /// Get value as f64
    #[must_use]
    pub const fn as_f64(self) -> f64 {
        self.0
    }

    /// Convert to `cpu.max` quota/period format
    ///
    /// Returns (quota, period) in microseconds
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn to_quota(self) -> (u64, u64) {
        let quota = (self.0 * Self::PERIOD_US as f64).round() as u64;
        (quota, Self::PERIOD_US)
    }

    /// Inverse of [`to_quota`](Self::to_quota)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_quota(quota: u64, period: u64) -> Self {
        if period == 0 {
            return Self(0.0);
        }
        Self(quota as f64 / period as f64)
    }
}

impl fmt::Display for CpuCores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} cores", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_names_round_trip() {
        for t in ResourceType::ALL {
            assert_eq!(t.as_str().parse::<ResourceType>().unwrap(), t);
        }
        assert!("gpu".parse::<ResourceType>().is_err());
        assert_eq!(
            serde_json::to_string(&ResourceType::DiskIo).unwrap(),
            "\"diskio\""
        );
    }

    #[test]
    fn memory_size_conversions() {
        let size = MemorySize::from_mb(512);
        assert_eq!(size.as_bytes(), 536_870_912);
        assert_eq!(MemorySize::from_mb(1), MemorySize::from_bytes(1_048_576));
        assert_eq!(MemorySize::from_mb(u64::MAX).as_bytes(), u64::MAX);
    }

    #[test]
    fn cpu_quota_conversion() {
        assert_eq!(CpuCores::new(1.0).to_quota(), (100_000, 100_000));
        assert_eq!(CpuCores::new(0.5).to_quota(), (50_000, 100_000));
        assert_eq!(CpuCores::from_quota(150_000, 100_000), CpuCores::new(1.5));
    }

    #[test]
    fn limit_display_and_serde() {
        assert_eq!(Limit::<MemorySize>::Max.to_string(), "max");
        assert_eq!(Limit::Value(MemorySize::from_bytes(1024)).to_string(), "1024");

        let json = serde_json::to_string(&Limit::Value(MemorySize::from_bytes(10))).unwrap();
        assert_eq!(json, r#"{"value":10}"#);
        let max: Limit<MemorySize> = serde_json::from_str("\"max\"").unwrap();
        assert_eq!(max, Limit::Max);
    }
}
