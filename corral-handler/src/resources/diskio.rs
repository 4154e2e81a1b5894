//! Block I/O weight and per-device bandwidth limits
//!
//! Files:
//! - `io.weight`: `default $WEIGHT` followed by per-device overrides
//! - `io.max`: one `$MAJ:$MIN rbps=.. wbps=.. riops=.. wiops=..` line per
//!   limited device
//! - `io.stat`: one `$MAJ:$MIN rbytes=.. wbytes=.. rios=.. wios=..` line per
//!   device

use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::debug;

use corral_core::{
    ContainerSpec, ContainerStats, DeviceIoStats, DeviceLimit, DiskIoSpec, DiskIoStats, Error,
    Limit, ResourceType, Result, StatsType,
};

use crate::parse::{parse_device, parse_limit_value, parse_nested_line, parse_u64};
use crate::resource::{Group, Knob, Resource, check_range};

const WEIGHT_FILE: &str = "io.weight";
const MAX_FILE: &str = "io.max";
const STAT_FILE: &str = "io.stat";

/// Block I/O resource
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskIoResource;

fn device_value(limit: &DeviceLimit) -> String {
    format!(
        "{}:{} rbps={} wbps={}",
        limit.major, limit.minor, limit.read_bps, limit.write_bps
    )
}

fn parse_weight(content: &str) -> Result<u16> {
    let weight = content
        .lines()
        .find_map(|line| line.strip_prefix("default "))
        .ok_or_else(|| Error::internal(format!("no default weight in {WEIGHT_FILE}")))?;
    let weight = parse_u64(WEIGHT_FILE, weight)?;
    u16::try_from(weight)
        .map_err(|_| Error::internal(format!("weight {weight} in {WEIGHT_FILE} out of range")))
}

fn parse_device_limits(content: &str) -> Vec<DeviceLimit> {
    let mut limits: Vec<DeviceLimit> = content
        .lines()
        .filter_map(parse_nested_line)
        .filter_map(|(device, values)| {
            let (major, minor) = parse_device(device)?;
            Some(DeviceLimit {
                major,
                minor,
                read_bps: parse_limit_value(values.get("rbps")),
                write_bps: parse_limit_value(values.get("wbps")),
            })
        })
        .filter(|limit| *limit != DeviceLimit::unlimited(limit.major, limit.minor))
        .collect();
    limits.sort_by_key(DeviceLimit::device);
    limits
}

#[async_trait]
impl Resource for DiskIoResource {
    const TYPE: ResourceType = ResourceType::DiskIo;
    const CONTROLLERS: &'static [&'static str] = &["io"];

    type Section = DiskIoSpec;
    type Stats = DiskIoStats;

    fn section(spec: &ContainerSpec) -> Option<&DiskIoSpec> {
        spec.diskio.as_ref()
    }

    fn store(spec: &mut ContainerSpec, section: DiskIoSpec) {
        spec.diskio = Some(section);
    }

    fn store_stats(stats: &mut ContainerStats, section: DiskIoStats) {
        stats.diskio = Some(section);
    }

    fn validate(section: &DiskIoSpec) -> Result<()> {
        check_range("io weight", section.weight, 1, 10_000)?;

        let mut seen = BTreeSet::new();
        for limit in section.device_limits.iter().flatten() {
            if !seen.insert(limit.device()) {
                return Err(Error::invalid_argument(format!(
                    "device {}:{} listed twice",
                    limit.major, limit.minor
                )));
            }
            if limit.read_bps == Limit::Value(0) || limit.write_bps == Limit::Value(0) {
                return Err(Error::invalid_argument(format!(
                    "device {}:{} bandwidth must be positive",
                    limit.major, limit.minor
                )));
            }
        }
        Ok(())
    }

    fn knobs(section: &DiskIoSpec, live: Option<&DiskIoSpec>) -> Vec<Knob> {
        let mut knobs = Vec::new();
        if let Some(weight) = section.weight {
            knobs.push(Knob::new(0, WEIGHT_FILE, format!("default {weight}")));
        }

        // one conflict group per device
        let targets = section.device_limits.as_deref().unwrap_or_default();
        let stale = live
            .and_then(|l| l.device_limits.as_deref())
            .unwrap_or_default()
            .iter()
            .filter(|l| !targets.iter().any(|t| t.device() == l.device()))
            .map(|l| DeviceLimit::unlimited(l.major, l.minor));

        for (i, limit) in targets.iter().copied().chain(stale).enumerate() {
            knobs.push(Knob::new(i + 1, MAX_FILE, device_value(&limit)));
        }
        knobs
    }

    async fn read_spec(group: &Group) -> Result<DiskIoSpec> {
        let weight = parse_weight(&group.read(WEIGHT_FILE).await?)?;
        let device_limits = match group.read_optional(MAX_FILE).await? {
            Some(content) => parse_device_limits(&content),
            None => Vec::new(),
        };

        Ok(DiskIoSpec {
            weight: Some(weight),
            device_limits: Some(device_limits),
        })
    }

    async fn read_stats(group: &Group, stats_type: StatsType) -> Result<DiskIoStats> {
        let Some(content) = group.read_optional(STAT_FILE).await? else {
            // io.stat might not exist or be accessible
            return Ok(DiskIoStats::default());
        };

        let mut stats = DiskIoStats::default();
        for (device, values) in content.lines().filter_map(parse_nested_line) {
            let Some((major, minor)) = parse_device(device) else {
                continue;
            };
            let counter = |key: &str| {
                values
                    .get(key)
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or_default()
            };
            let device = DeviceIoStats {
                major,
                minor,
                read_bytes: counter("rbytes"),
                write_bytes: counter("wbytes"),
                read_ios: counter("rios"),
                write_ios: counter("wios"),
            };

            stats.read_bytes += device.read_bytes;
            stats.write_bytes += device.write_bytes;
            if stats_type == StatsType::Full {
                stats.devices.push(device);
            }
        }

        debug!(
            container = %group.name(),
            read_bytes = stats.read_bytes,
            write_bytes = stats.write_bytes,
            "I/O stats"
        );

        Ok(stats)
    }
}
