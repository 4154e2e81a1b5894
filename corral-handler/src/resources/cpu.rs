//! CPU bandwidth and weight
//!
//! Files:
//! - `cpu.max`: `"$QUOTA $PERIOD"` or `"max $PERIOD"`
//! - `cpu.weight`: 1..=10000
//! - `cpu.stat`: usage and throttling counters

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use corral_core::{
    ContainerSpec, ContainerStats, CpuCores, CpuSpec, CpuStats, Error, Limit, ResourceType,
    Result, StatsType,
};

use crate::parse::{parse_flat_keyed, parse_u64};
use crate::resource::{Group, Knob, Resource, check_range};

const MAX_FILE: &str = "cpu.max";
const WEIGHT_FILE: &str = "cpu.weight";
const STAT_FILE: &str = "cpu.stat";

/// CPU resource
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuResource;

fn max_value(limit: Limit<CpuCores>) -> String {
    match limit {
        Limit::Max => format!("max {}", CpuCores::PERIOD_US),
        Limit::Value(cores) => {
            let (quota, period) = cores.to_quota();
            format!("{quota} {period}")
        }
    }
}

fn parse_max(content: &str) -> Result<Limit<CpuCores>> {
    let mut parts = content.split_whitespace();
    let quota = parts.next();
    let period = parts.next().map(|p| parse_u64(MAX_FILE, p)).transpose()?;

    match (quota, period) {
        (Some("max"), _) => Ok(Limit::Max),
        (Some(quota), Some(period)) => Ok(Limit::Value(CpuCores::from_quota(
            parse_u64(MAX_FILE, quota)?,
            period,
        ))),
        _ => Err(Error::internal(format!(
            "unexpected content in {MAX_FILE}: {content:?}"
        ))),
    }
}

#[async_trait]
impl Resource for CpuResource {
    const TYPE: ResourceType = ResourceType::Cpu;
    const CONTROLLERS: &'static [&'static str] = &["cpu"];

    type Section = CpuSpec;
    type Stats = CpuStats;

    fn section(spec: &ContainerSpec) -> Option<&CpuSpec> {
        spec.cpu.as_ref()
    }

    fn store(spec: &mut ContainerSpec, section: CpuSpec) {
        spec.cpu = Some(section);
    }

    fn store_stats(stats: &mut ContainerStats, section: CpuStats) {
        stats.cpu = Some(section);
    }

    fn validate(section: &CpuSpec) -> Result<()> {
        if let Some(Limit::Value(cores)) = section.limit {
            let value = cores.as_f64();
            if !value.is_finite() || value <= 0.0 || cores.to_quota().0 == 0 {
                return Err(Error::invalid_argument(format!(
                    "cpu limit must be positive, got {value}"
                )));
            }
        }
        check_range("cpu weight", section.weight, 1, 10_000)
    }

    fn knobs(section: &CpuSpec, _live: Option<&CpuSpec>) -> Vec<Knob> {
        let mut knobs = Vec::new();
        if let Some(limit) = section.limit {
            knobs.push(Knob::new(0, MAX_FILE, max_value(limit)));
        }
        if let Some(weight) = section.weight {
            knobs.push(Knob::new(1, WEIGHT_FILE, weight.to_string()));
        }
        knobs
    }

    async fn read_spec(group: &Group) -> Result<CpuSpec> {
        let limit = parse_max(&group.read(MAX_FILE).await?)?;
        let weight = parse_u64(WEIGHT_FILE, &group.read(WEIGHT_FILE).await?)?;

        Ok(CpuSpec {
            limit: Some(limit),
            weight: Some(weight),
        })
    }

    async fn read_stats(group: &Group, stats_type: StatsType) -> Result<CpuStats> {
        let content = group.read(STAT_FILE).await?;
        let stat = parse_flat_keyed(&content);
        let micros = |key: &str| stat.get(key).copied().map(Duration::from_micros);

        let mut stats = CpuStats {
            usage: micros("usage_usec").unwrap_or_default(),
            throttled: micros("throttled_usec").unwrap_or_default(),
            ..Default::default()
        };

        if stats_type == StatsType::Full {
            stats.user = micros("user_usec");
            stats.system = micros("system_usec");
            stats.periods = stat.get("nr_periods").copied();
            stats.throttled_periods = stat.get("nr_throttled").copied();
        }

        debug!(
            container = %group.name(),
            usage_us = stats.usage.as_micros(),
            throttled_us = stats.throttled.as_micros(),
            "CPU stats"
        );

        Ok(stats)
    }
}
