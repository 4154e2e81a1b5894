//! Event subscription requests

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, MemorySize, Result};

/// A subscription request. Must name exactly one event kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventSpec {
    /// OOM kill inside the group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oom: Option<OomEvent>,
    /// Memory usage crossing a threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_threshold: Option<MemoryThresholdEvent>,
    /// Stall time growth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<PressureEvent>,
    /// Last task left the group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_empty: Option<ContainerEmptyEvent>,
}

/// Fires every time the `oom_kill` counter increases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OomEvent {}

/// Fires when usage reaches `usage`; re-arms once usage drops below it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryThresholdEvent {
    /// Threshold
    pub usage: MemorySize,
}

/// Fires when `some` stall time grows by at least `stall_us` within one
/// poll interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressureEvent {
    /// Which PSI file to watch
    pub resource: PressureResource,
    /// Minimum stall growth in microseconds
    pub stall_us: u64,
}

/// Fires once when the group becomes unpopulated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEmptyEvent {}

/// PSI resource types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureResource {
    /// CPU pressure
    Cpu,
    /// Memory pressure
    Memory,
    /// I/O pressure
    Io,
}

impl PressureResource {
    /// cgroup PSI file name
    #[must_use]
    pub const fn cgroup_file(self) -> &'static str {
        match self {
            Self::Cpu => "cpu.pressure",
            Self::Memory => "memory.pressure",
            Self::Io => "io.pressure",
        }
    }
}

/// The single event an [`EventSpec`] names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// See [`OomEvent`]
    Oom,
    /// See [`MemoryThresholdEvent`]
    MemoryThreshold(MemoryThresholdEvent),
    /// See [`PressureEvent`]
    Pressure(PressureEvent),
    /// See [`ContainerEmptyEvent`]
    ContainerEmpty,
}

impl EventSpec {
    /// The one event kind this spec names
    ///
    /// # Errors
    /// `InvalidArgument` when the spec names zero or several kinds
    pub fn kind(&self) -> Result<EventKind> {
        let mut kinds = Vec::with_capacity(1);
        if self.oom.is_some() {
            kinds.push(EventKind::Oom);
        }
        if let Some(threshold) = self.memory_threshold {
            kinds.push(EventKind::MemoryThreshold(threshold));
        }
        if let Some(pressure) = self.pressure {
            kinds.push(EventKind::Pressure(pressure));
        }
        if self.container_empty.is_some() {
            kinds.push(EventKind::ContainerEmpty);
        }

        match kinds.as_slice() {
            [kind] => Ok(*kind),
            [] => Err(Error::invalid_argument("event spec names no event")),
            _ => Err(Error::invalid_argument(format!(
                "event spec must name exactly one event, found {}",
                kinds.len()
            ))),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oom => f.write_str("oom"),
            Self::MemoryThreshold(t) => write!(f, "memory_threshold({} bytes)", t.usage),
            Self::Pressure(p) => {
                write!(f, "pressure({}, {}us)", p.resource.cgroup_file(), p.stall_us)
            }
            Self::ContainerEmpty => f.write_str("container_empty"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_kind_is_extracted() {
        let spec = EventSpec {
            oom: Some(OomEvent {}),
            ..Default::default()
        };
        assert_eq!(spec.kind().unwrap(), EventKind::Oom);
    }

    #[test]
    fn multi_kind_spec_is_rejected() {
        let spec = EventSpec {
            oom: Some(OomEvent {}),
            container_empty: Some(ContainerEmptyEvent {}),
            ..Default::default()
        };
        let err = spec.kind().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn empty_spec_is_rejected() {
        let err = EventSpec::default().kind().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn event_spec_from_json() {
        let spec: EventSpec =
            serde_json::from_str(r#"{"memory_threshold": {"usage": 1048576}}"#).unwrap();
        assert_eq!(
            spec.kind().unwrap(),
            EventKind::MemoryThreshold(MemoryThresholdEvent {
                usage: MemorySize::from_mb(1)
            })
        );
    }
}
