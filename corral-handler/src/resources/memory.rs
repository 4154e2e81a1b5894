//! Memory limit, reservation and swap
//!
//! Serves the `oom` and `memory_threshold` events.

use async_trait::async_trait;
use tracing::debug;

use corral_core::{
    ContainerSpec, ContainerStats, Error, EventKind, Limit, MemorySize, MemorySpec, MemoryStats,
    ResourceType, Result, StatsType,
};

use crate::notify::Probe;
use crate::parse::{parse_flat_keyed, parse_limit, parse_u64};
use crate::resource::{Group, Knob, Resource};

const MAX_FILE: &str = "memory.max";
const LOW_FILE: &str = "memory.low";
const SWAP_MAX_FILE: &str = "memory.swap.max";
const CURRENT_FILE: &str = "memory.current";
const PEAK_FILE: &str = "memory.peak";
const SWAP_CURRENT_FILE: &str = "memory.swap.current";
const STAT_FILE: &str = "memory.stat";
const EVENTS_FILE: &str = "memory.events";

/// Memory resource
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryResource;

fn bytes(limit: Limit<u64>) -> Limit<MemorySize> {
    match limit {
        Limit::Max => Limit::Max,
        Limit::Value(v) => Limit::Value(MemorySize::from_bytes(v)),
    }
}

#[async_trait]
impl Resource for MemoryResource {
    const TYPE: ResourceType = ResourceType::Memory;
    const CONTROLLERS: &'static [&'static str] = &["memory"];

    type Section = MemorySpec;
    type Stats = MemoryStats;

    fn section(spec: &ContainerSpec) -> Option<&MemorySpec> {
        spec.memory.as_ref()
    }

    fn store(spec: &mut ContainerSpec, section: MemorySpec) {
        spec.memory = Some(section);
    }

    fn store_stats(stats: &mut ContainerStats, section: MemoryStats) {
        stats.memory = Some(section);
    }

    fn validate(section: &MemorySpec) -> Result<()> {
        if let (Some(Limit::Value(limit)), Some(reservation)) = (section.limit, section.reservation)
            && reservation > limit
        {
            return Err(Error::invalid_argument(format!(
                "memory reservation {reservation} exceeds limit {limit}"
            )));
        }
        Ok(())
    }

    fn knobs(section: &MemorySpec, _live: Option<&MemorySpec>) -> Vec<Knob> {
        let mut knobs = Vec::new();
        // limit and reservation move together
        if let Some(limit) = section.limit {
            knobs.push(Knob::new(0, MAX_FILE, limit.to_string()));
        }
        if let Some(reservation) = section.reservation {
            knobs.push(Knob::new(0, LOW_FILE, reservation.to_string()));
        }
        if let Some(swap) = section.swap_limit {
            knobs.push(Knob::new(1, SWAP_MAX_FILE, swap.to_string()));
        }
        knobs
    }

    async fn read_spec(group: &Group) -> Result<MemorySpec> {
        let limit = parse_limit(MAX_FILE, &group.read(MAX_FILE).await?)?;
        let reservation = parse_u64(LOW_FILE, &group.read(LOW_FILE).await?)?;
        let swap_limit = match group.read_optional(SWAP_MAX_FILE).await? {
            Some(content) => parse_limit(SWAP_MAX_FILE, &content)?,
            None => Limit::Max,
        };

        Ok(MemorySpec {
            limit: Some(bytes(limit)),
            reservation: Some(MemorySize::from_bytes(reservation)),
            swap_limit: Some(bytes(swap_limit)),
        })
    }

    async fn read_stats(group: &Group, stats_type: StatsType) -> Result<MemoryStats> {
        let usage = MemorySize::from_bytes(parse_u64(
            CURRENT_FILE,
            &group.read(CURRENT_FILE).await?,
        )?);

        // memory.peak might not exist on older kernels
        let peak = match group.read_optional(PEAK_FILE).await? {
            Some(content) => MemorySize::from_bytes(parse_u64(PEAK_FILE, &content)?),
            None => usage,
        };

        let mut stats = MemoryStats {
            usage,
            peak: Some(peak),
            ..Default::default()
        };

        if stats_type == StatsType::Full {
            if let Some(content) = group.read_optional(SWAP_CURRENT_FILE).await? {
                stats.swap_usage = Some(MemorySize::from_bytes(parse_u64(
                    SWAP_CURRENT_FILE,
                    &content,
                )?));
            }

            let content = group.read(STAT_FILE).await?;
            let stat = parse_flat_keyed(&content);
            stats.anon = stat.get("anon").copied().map(MemorySize::from_bytes);
            stats.file = stat.get("file").copied().map(MemorySize::from_bytes);

            let content = group.read(EVENTS_FILE).await?;
            stats.oom_kills = parse_flat_keyed(&content).get("oom_kill").copied();
        }

        debug!(container = %group.name(), usage = %stats.usage, peak = %peak, "Memory stats");

        Ok(stats)
    }

    fn probe(kind: EventKind) -> Result<Probe> {
        match kind {
            EventKind::Oom => Ok(Probe::counter(EVENTS_FILE, "oom_kill")),
            EventKind::MemoryThreshold(threshold) => {
                if threshold.usage.as_bytes() == 0 {
                    return Err(Error::invalid_argument("memory threshold must be positive"));
                }
                Ok(Probe::threshold(CURRENT_FILE, threshold.usage.as_bytes()))
            }
            other => Err(Error::not_found(format!("memory does not serve {other} events"))),
        }
    }
}
