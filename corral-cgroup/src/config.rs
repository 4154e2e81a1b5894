//! Backend configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use corral_core::{Error, ResourceType, Result};

/// Shortest notification poll interval; shorter values are raised to it
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Where resource hierarchies live and how often subscriptions poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CgroupConfig {
    /// Mount point containing one hierarchy directory per resource
    pub root: PathBuf,

    /// Hierarchy directory name per resource; missing entries fall back to
    /// [`CgroupConfig::default_hierarchy`]
    pub hierarchies: BTreeMap<ResourceType, String>,

    /// Notification poll interval
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
}

impl Default for CgroupConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(crate::CGROUP_ROOT),
            hierarchies: BTreeMap::new(),
            poll_interval: Duration::from_millis(250),
        }
    }
}

impl CgroupConfig {
    /// Create a configuration with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON configuration file
    ///
    /// # Errors
    /// `NotFound` if the file is missing, `InvalidArgument` if it does not
    /// parse or sets a zero `poll_interval`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::from(e).context(format!("read {}", path.display())))?;
        serde_json::from_str(&content).map_err(|e| {
            Error::invalid_argument(format!("parse {}: {e}", path.display()))
        })
    }

    /// Set the hierarchy mount point
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Override the hierarchy directory for one resource
    #[must_use]
    pub fn with_hierarchy(mut self, resource: ResourceType, dir: impl Into<String>) -> Self {
        self.hierarchies.insert(resource, dir.into());
        self
    }

    /// Set the notification poll interval, raised to [`MIN_POLL_INTERVAL`]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Hierarchy directory name for `resource`
    #[must_use]
    pub fn hierarchy(&self, resource: ResourceType) -> &str {
        self.hierarchies
            .get(&resource)
            .map_or_else(|| Self::default_hierarchy(resource), String::as_str)
    }

    /// Conventional mount point names
    #[must_use]
    pub const fn default_hierarchy(resource: ResourceType) -> &'static str {
        match resource {
            ResourceType::Cpu => "cpu",
            ResourceType::Memory => "memory",
            ResourceType::DiskIo => "blkio",
            ResourceType::Network => "net_cls",
            ResourceType::Monitoring => "perf_event",
            ResourceType::Global => "pids",
        }
    }
}

mod duration_millis {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        if millis == 0 {
            return Err(D::Error::custom("poll_interval must be at least 1 ms"));
        }
        Ok(Duration::from_millis(millis))
    }
}
