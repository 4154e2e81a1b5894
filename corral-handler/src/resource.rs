//! Per-resource behaviour plugged into the generic cgroup handler
//!
//! A [`Resource`] says how its spec section lowers to interface file writes
//! ([`Knob`]s), how live state reads back into a section, which statistics
//! it reports, and which events it can watch.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, warn};

use corral_cgroup::GroupBackend;
use corral_core::{
    ContainerName, ContainerSpec, ContainerStats, Error, EventKind, ResourceType, Result,
    SpecSection, StatsType, ThreadId,
};

use crate::notify::Probe;

/// One resource group: a container's directory in one hierarchy
#[derive(Clone)]
pub struct Group {
    backend: Arc<dyn GroupBackend>,
    resource: ResourceType,
    name: ContainerName,
}

impl Group {
    /// Address `name` in the hierarchy of `resource`
    #[must_use]
    pub fn new(backend: Arc<dyn GroupBackend>, resource: ResourceType, name: ContainerName) -> Self {
        Self {
            backend,
            resource,
            name,
        }
    }

    /// Container name
    #[must_use]
    pub const fn name(&self) -> &ContainerName {
        &self.name
    }

    /// Owning resource type
    #[must_use]
    pub const fn resource(&self) -> ResourceType {
        self.resource
    }

    /// Read an interface file
    pub async fn read(&self, file: &str) -> Result<String> {
        self.backend.read(self.resource, &self.name, file).await
    }

    /// Read a file that older kernels or disabled features may not provide
    pub async fn read_optional(&self, file: &str) -> Result<Option<String>> {
        match self.read(file).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == corral_core::ErrorKind::NotFound => {
                debug!(resource = %self.resource, container = %self.name, file, "File not available");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Write an interface file
    pub async fn write(&self, file: &str, value: &str) -> Result<()> {
        self.backend.write(self.resource, &self.name, file, value).await
    }

    /// Move a thread into this group
    pub async fn move_thread(&self, tid: ThreadId) -> Result<()> {
        self.backend.move_thread(self.resource, &self.name, tid).await
    }

    /// Remove this group
    pub async fn remove(&self) -> Result<()> {
        self.backend.remove_group(self.resource, &self.name).await
    }

    /// Apply writes in order
    ///
    /// After a failed write, later knobs of the same conflict group are
    /// skipped while other groups are still written. Returns the first
    /// error.
    pub async fn apply(&self, knobs: Vec<Knob>) -> Result<()> {
        let mut failed_groups = HashSet::new();
        let mut first_error = None;

        for knob in knobs {
            if failed_groups.contains(&knob.group) {
                debug!(
                    resource = %self.resource,
                    container = %self.name,
                    file = knob.file,
                    "Skipping write after failure in the same group"
                );
                continue;
            }

            if let Err(e) = self.write(knob.file, &knob.value).await {
                warn!(
                    resource = %self.resource,
                    container = %self.name,
                    file = knob.file,
                    value = %knob.value,
                    error = %e,
                    "Write failed"
                );
                failed_groups.insert(knob.group);
                if first_error.is_none() {
                    first_error = Some(e.context(format!("update {} of {}", knob.file, self.name)));
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("resource", &self.resource)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A pending interface file write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Knob {
    /// Conflict group; a failure skips the rest of its group
    pub group: usize,
    /// Interface file
    pub file: &'static str,
    /// Content to write
    pub value: String,
}

impl Knob {
    /// Create a write of `value` to `file`
    pub fn new(group: usize, file: &'static str, value: impl Into<String>) -> Self {
        Self {
            group,
            file,
            value: value.into(),
        }
    }
}

/// Behaviour of one resource type
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Resource type served
    const TYPE: ResourceType;

    /// Kernel controllers enabled by default at machine init
    const CONTROLLERS: &'static [&'static str];

    /// This resource's section of [`ContainerSpec`]
    type Section: SpecSection;

    /// This resource's section of [`ContainerStats`]
    type Stats: Send;

    /// Borrow the section from an aggregate spec
    fn section(spec: &ContainerSpec) -> Option<&Self::Section>;

    /// Store a section into an aggregate spec
    fn store(spec: &mut ContainerSpec, section: Self::Section);

    /// Store statistics into an aggregate
    fn store_stats(stats: &mut ContainerStats, section: Self::Stats);

    /// Reject malformed sections before anything is written
    fn validate(section: &Self::Section) -> Result<()>;

    /// Writes applying `section`
    ///
    /// `live` is the current state when fully reconciling; entries it has
    /// that `section` lacks must be reset. It is `None` for sparse updates.
    fn knobs(section: &Self::Section, live: Option<&Self::Section>) -> Vec<Knob>;

    /// Read the live section
    async fn read_spec(group: &Group) -> Result<Self::Section>;

    /// Read statistics
    async fn read_stats(group: &Group, stats_type: StatsType) -> Result<Self::Stats>;

    /// Build a watcher for `kind`
    ///
    /// # Errors
    /// `NotFound` if this resource does not serve the event
    fn probe(kind: EventKind) -> Result<Probe> {
        Err(Error::not_found(format!(
            "{} does not serve {kind} events",
            Self::TYPE
        )))
    }
}

/// Reject `value` outside `min..=max`
pub fn check_range<T>(what: &str, value: Option<T>, min: T, max: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    match value {
        Some(v) if v < min || v > max => Err(Error::invalid_argument(format!(
            "{what} {v} out of range {min}..={max}"
        ))),
        _ => Ok(()),
    }
}
