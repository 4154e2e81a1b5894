//! Pressure stall information
//!
//! Serves the `pressure` event.

use async_trait::async_trait;

use corral_core::{
    ContainerSpec, ContainerStats, Error, EventKind, MonitoringSpec, MonitoringStats, Pressure,
    PressureResource, ResourceType, Result, StatsType,
};

use crate::notify::Probe;
use crate::parse::{parse_bool, parse_pressure};
use crate::resource::{Group, Knob, Resource};

const PRESSURE_FILE: &str = "cgroup.pressure";

/// Monitoring resource
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitoringResource;

async fn read_pressure(
    group: &Group,
    resource: PressureResource,
    stats_type: StatsType,
) -> Result<Option<Pressure>> {
    let file = resource.cgroup_file();
    // PSI files are absent when accounting is off
    let Some(content) = group.read_optional(file).await? else {
        return Ok(None);
    };

    let mut pressure = parse_pressure(file, &content)?;
    if stats_type == StatsType::Summary {
        pressure.full = None;
    }
    Ok(Some(pressure))
}

#[async_trait]
impl Resource for MonitoringResource {
    const TYPE: ResourceType = ResourceType::Monitoring;
    const CONTROLLERS: &'static [&'static str] = &["cpu", "memory", "io"];

    type Section = MonitoringSpec;
    type Stats = MonitoringStats;

    fn section(spec: &ContainerSpec) -> Option<&MonitoringSpec> {
        spec.monitoring.as_ref()
    }

    fn store(spec: &mut ContainerSpec, section: MonitoringSpec) {
        spec.monitoring = Some(section);
    }

    fn store_stats(stats: &mut ContainerStats, section: MonitoringStats) {
        stats.monitoring = Some(section);
    }

    fn validate(_section: &MonitoringSpec) -> Result<()> {
        Ok(())
    }

    fn knobs(section: &MonitoringSpec, _live: Option<&MonitoringSpec>) -> Vec<Knob> {
        section
            .pressure
            .map(|on| Knob::new(0, PRESSURE_FILE, if on { "1" } else { "0" }))
            .into_iter()
            .collect()
    }

    async fn read_spec(group: &Group) -> Result<MonitoringSpec> {
        // kernels without the knob always account
        let pressure = match group.read_optional(PRESSURE_FILE).await? {
            Some(content) => parse_bool(PRESSURE_FILE, &content)?,
            None => true,
        };
        Ok(MonitoringSpec {
            pressure: Some(pressure),
        })
    }

    async fn read_stats(group: &Group, stats_type: StatsType) -> Result<MonitoringStats> {
        Ok(MonitoringStats {
            cpu: read_pressure(group, PressureResource::Cpu, stats_type).await?,
            memory: read_pressure(group, PressureResource::Memory, stats_type).await?,
            io: read_pressure(group, PressureResource::Io, stats_type).await?,
        })
    }

    fn probe(kind: EventKind) -> Result<Probe> {
        match kind {
            EventKind::Pressure(event) => {
                if event.stall_us == 0 {
                    return Err(Error::invalid_argument("stall threshold must be positive"));
                }
                Ok(Probe::stall(event.resource.cgroup_file(), event.stall_us))
            }
            other => Err(Error::not_found(format!(
                "monitoring does not serve {other} events"
            ))),
        }
    }
}
