//! Network classification: class id and per-interface priority

use async_trait::async_trait;
use std::collections::BTreeMap;

use corral_core::{
    ContainerSpec, ContainerStats, Error, NetworkSpec, NetworkStats, ResourceType, Result,
    StatsType,
};

use crate::parse::parse_u64;
use crate::resource::{Group, Knob, Resource};

const CLASSID_FILE: &str = "net_cls.classid";
const PRIOMAP_FILE: &str = "net_prio.ifpriomap";

/// Network resource
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkResource;

/// Interfaces with a non-default priority
fn parse_priomap(content: &str) -> BTreeMap<String, u32> {
    content
        .lines()
        .filter_map(|line| {
            let (iface, prio) = line.split_once(' ')?;
            let prio: u32 = prio.trim().parse().ok()?;
            (prio != 0).then(|| (iface.to_string(), prio))
        })
        .collect()
}

async fn read_live(group: &Group) -> Result<(u32, BTreeMap<String, u32>)> {
    let class_id = parse_u64(CLASSID_FILE, &group.read(CLASSID_FILE).await?)?;
    let class_id = u32::try_from(class_id)
        .map_err(|_| Error::internal(format!("class id {class_id} out of range")))?;
    let priorities = parse_priomap(&group.read(PRIOMAP_FILE).await?);
    Ok((class_id, priorities))
}

#[async_trait]
impl Resource for NetworkResource {
    const TYPE: ResourceType = ResourceType::Network;
    const CONTROLLERS: &'static [&'static str] = &["net_cls", "net_prio"];

    type Section = NetworkSpec;
    type Stats = NetworkStats;

    fn section(spec: &ContainerSpec) -> Option<&NetworkSpec> {
        spec.network.as_ref()
    }

    fn store(spec: &mut ContainerSpec, section: NetworkSpec) {
        spec.network = Some(section);
    }

    fn store_stats(stats: &mut ContainerStats, section: NetworkStats) {
        stats.network = Some(section);
    }

    fn validate(section: &NetworkSpec) -> Result<()> {
        for iface in section.priorities.iter().flat_map(BTreeMap::keys) {
            if iface.is_empty() || iface.chars().any(char::is_whitespace) {
                return Err(Error::invalid_argument(format!(
                    "invalid interface name {iface:?}"
                )));
            }
        }
        Ok(())
    }

    fn knobs(section: &NetworkSpec, live: Option<&NetworkSpec>) -> Vec<Knob> {
        let mut knobs = Vec::new();
        if let Some(class_id) = section.class_id {
            knobs.push(Knob::new(0, CLASSID_FILE, class_id.to_string()));
        }

        let empty = BTreeMap::new();
        let targets = section.priorities.as_ref().unwrap_or(&empty);
        let stale = live
            .and_then(|l| l.priorities.as_ref())
            .unwrap_or(&empty)
            .keys()
            .filter(|iface| !targets.contains_key(*iface))
            .map(|iface| (iface, &0));

        for (i, (iface, prio)) in targets.iter().chain(stale).enumerate() {
            knobs.push(Knob::new(i + 1, PRIOMAP_FILE, format!("{iface} {prio}")));
        }
        knobs
    }

    async fn read_spec(group: &Group) -> Result<NetworkSpec> {
        let (class_id, priorities) = read_live(group).await?;
        Ok(NetworkSpec {
            class_id: Some(class_id),
            priorities: Some(priorities),
        })
    }

    async fn read_stats(group: &Group, _stats_type: StatsType) -> Result<NetworkStats> {
        let (class_id, priorities) = read_live(group).await?;
        Ok(NetworkStats {
            class_id,
            priorities,
        })
    }
}
