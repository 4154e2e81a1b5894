//! Container-wide knobs: task limit and freezer
//!
//! Serves the `container_empty` event.

use async_trait::async_trait;

use corral_cgroup::{EVENTS_FILE, THREADS_FILE};
use corral_core::{
    ContainerSpec, ContainerStats, Error, EventKind, GlobalSpec, GlobalStats, Limit,
    ResourceType, Result, StatsType, ThreadId,
};

use crate::notify::Probe;
use crate::parse::{parse_bool, parse_flat_keyed, parse_limit, parse_u64};
use crate::resource::{Group, Knob, Resource};

const PIDS_MAX_FILE: &str = "pids.max";
const PIDS_CURRENT_FILE: &str = "pids.current";
const FREEZE_FILE: &str = "cgroup.freeze";

/// Container-wide resource
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalResource;

fn parse_threads(content: &str) -> Vec<ThreadId> {
    content
        .lines()
        .filter_map(|line| line.parse().ok())
        .collect()
}

#[async_trait]
impl Resource for GlobalResource {
    const TYPE: ResourceType = ResourceType::Global;
    const CONTROLLERS: &'static [&'static str] = &["pids"];

    type Section = GlobalSpec;
    type Stats = GlobalStats;

    fn section(spec: &ContainerSpec) -> Option<&GlobalSpec> {
        spec.global.as_ref()
    }

    fn store(spec: &mut ContainerSpec, section: GlobalSpec) {
        spec.global = Some(section);
    }

    fn store_stats(stats: &mut ContainerStats, section: GlobalStats) {
        stats.global = Some(section);
    }

    fn validate(section: &GlobalSpec) -> Result<()> {
        if section.max_tasks == Some(Limit::Value(0)) {
            return Err(Error::invalid_argument("max_tasks must be positive"));
        }
        Ok(())
    }

    fn knobs(section: &GlobalSpec, _live: Option<&GlobalSpec>) -> Vec<Knob> {
        let mut knobs = Vec::new();
        if let Some(max_tasks) = section.max_tasks {
            knobs.push(Knob::new(0, PIDS_MAX_FILE, max_tasks.to_string()));
        }
        if let Some(frozen) = section.frozen {
            knobs.push(Knob::new(1, FREEZE_FILE, if frozen { "1" } else { "0" }));
        }
        knobs
    }

    async fn read_spec(group: &Group) -> Result<GlobalSpec> {
        let max_tasks = parse_limit(PIDS_MAX_FILE, &group.read(PIDS_MAX_FILE).await?)?;
        let frozen = parse_bool(FREEZE_FILE, &group.read(FREEZE_FILE).await?)?;
        Ok(GlobalSpec {
            max_tasks: Some(max_tasks),
            frozen: Some(frozen),
        })
    }

    async fn read_stats(group: &Group, stats_type: StatsType) -> Result<GlobalStats> {
        let tasks = parse_u64(PIDS_CURRENT_FILE, &group.read(PIDS_CURRENT_FILE).await?)?;

        let content = group.read(EVENTS_FILE).await?;
        let events = parse_flat_keyed(&content);
        let flag = |key: &str| events.get(key).is_some_and(|v| *v != 0);

        let mut stats = GlobalStats {
            tasks,
            populated: flag("populated"),
            frozen: flag("frozen"),
            threads: Vec::new(),
        };

        if stats_type == StatsType::Full {
            stats.threads = parse_threads(&group.read(THREADS_FILE).await?);
        }

        Ok(stats)
    }

    fn probe(kind: EventKind) -> Result<Probe> {
        match kind {
            EventKind::ContainerEmpty => Ok(Probe::drained(EVENTS_FILE)),
            other => Err(Error::not_found(format!("global does not serve {other} events"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_threads() {
        assert_eq!(
            parse_threads("12\n34\n\n"),
            vec![ThreadId::from_raw(12), ThreadId::from_raw(34)]
        );
    }

    #[test]
    fn test_zero_tasks_rejected() {
        let section = GlobalSpec {
            max_tasks: Some(Limit::Value(0)),
            frozen: None,
        };
        assert!(GlobalResource::validate(&section).is_err());
    }

    #[test]
    fn test_knobs() {
        let section = GlobalSpec {
            max_tasks: Some(Limit::Max),
            frozen: Some(true),
        };
        assert_eq!(
            GlobalResource::knobs(&section, None),
            vec![
                Knob::new(0, PIDS_MAX_FILE, "max"),
                Knob::new(1, FREEZE_FILE, "1"),
            ]
        );
    }
}
