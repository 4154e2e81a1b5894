//! Resource-group backend trait for pluggable implementations

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use corral_core::{ContainerName, Error, ResourceType, Result, ThreadId};

/// File listing the threads of a group
pub const THREADS_FILE: &str = "cgroup.threads";

/// File reporting `populated`/`frozen` state of a group
pub const EVENTS_FILE: &str = "cgroup.events";

/// Trait for resource-group backends
///
/// This is the OS boundary resource handlers talk to:
/// - [`CgroupFs`](crate::CgroupFs) - Interface files under a cgroup mount
/// - [`MockBackend`] - Testing without filesystem
///
/// Groups are addressed by resource type (which hierarchy) and container
/// name (where in it). Implementations do not serialize operations on the
/// same group; the caller does.
///
/// # Thread Safety
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait GroupBackend: Send + Sync {
    /// Prepare the hierarchy for `resource` with `controllers` enabled
    ///
    /// Returns `true` if anything had to be created or enabled, `false` if
    /// the hierarchy was already in place. Existing state is never torn down.
    async fn init_hierarchy(&self, resource: ResourceType, controllers: &[String]) -> Result<bool>;

    /// Create the group; the parent group must exist
    ///
    /// # Errors
    /// `AlreadyExists` if the group exists, `NotFound` if the parent does not
    async fn create_group(&self, resource: ResourceType, name: &ContainerName) -> Result<()>;

    /// Remove an empty group
    ///
    /// # Errors
    /// `NotFound` if missing, `FailedPrecondition` if it still has threads or
    /// children
    async fn remove_group(&self, resource: ResourceType, name: &ContainerName) -> Result<()>;

    /// Whether the group exists
    async fn group_exists(&self, resource: ResourceType, name: &ContainerName) -> Result<bool>;

    /// Read an interface file
    async fn read(&self, resource: ResourceType, name: &ContainerName, file: &str)
    -> Result<String>;

    /// Write an interface file
    async fn write(
        &self,
        resource: ResourceType,
        name: &ContainerName,
        file: &str,
        value: &str,
    ) -> Result<()>;

    /// Move one thread into the group
    async fn move_thread(
        &self,
        resource: ResourceType,
        name: &ContainerName,
        tid: ThreadId,
    ) -> Result<()>;
}

/// Mock backend for testing (doesn't touch filesystem)
///
/// Groups hold their interface files in memory. A handful of files behave
/// like the kernel's: `cgroup.threads`, `cgroup.events` and `pids.current`
/// are rendered from the group's threads, `io.max` and `net_prio.ifpriomap`
/// merge per-key writes. Failures can be injected per file, per thread, or
/// for group removal.
///
/// # Example
/// ```
/// use corral_cgroup::{GroupBackend, MockBackend};
/// use corral_core::{ContainerName, ResourceType, ThreadId};
///
/// # #[tokio::main]
/// # async fn main() {
/// let backend = MockBackend::new();
/// let name = ContainerName::new("/job").unwrap();
///
/// backend.init_hierarchy(ResourceType::Memory, &[]).await.unwrap();
/// backend.create_group(ResourceType::Memory, &name).await.unwrap();
/// backend.write(ResourceType::Memory, &name, "memory.max", "1048576").await.unwrap();
/// backend.move_thread(ResourceType::Memory, &name, ThreadId::from_raw(42)).await.unwrap();
///
/// let threads = backend.read(ResourceType::Memory, &name, "cgroup.threads").await.unwrap();
/// assert_eq!(threads.trim(), "42");
/// # }
/// ```
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    hierarchies: HashMap<ResourceType, Vec<String>>,
    groups: HashMap<(ResourceType, ContainerName), MockGroup>,
    init_steps: usize,
    failing_files: HashSet<String>,
    rejected_threads: HashSet<ThreadId>,
    failing_removals: usize,
    call_count: usize,
}

#[derive(Default)]
struct MockGroup {
    files: BTreeMap<String, String>,
    threads: Vec<ThreadId>,
}

impl MockBackend {
    /// Create a new mock backend
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Get the number of backend calls made (for testing)
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.call_count
    }

    /// Number of times a hierarchy had to be created or extended
    pub async fn init_steps(&self) -> usize {
        self.state.lock().await.init_steps
    }

    /// Check if a thread is in a group
    pub async fn has_thread(
        &self,
        resource: ResourceType,
        name: &ContainerName,
        tid: ThreadId,
    ) -> bool {
        self.state
            .lock()
            .await
            .groups
            .get(&(resource, name.clone()))
            .is_some_and(|g| g.threads.contains(&tid))
    }

    /// Overwrite a file verbatim, bypassing write semantics (for testing)
    pub async fn set_file(
        &self,
        resource: ResourceType,
        name: &ContainerName,
        file: &str,
        value: impl Into<String>,
    ) {
        if let Some(group) = self
            .state
            .lock()
            .await
            .groups
            .get_mut(&(resource, name.clone()))
        {
            group.files.insert(file.to_string(), value.into());
        }
    }

    /// Make every write to `file` fail with `Internal`
    pub async fn fail_writes_to(&self, file: &str) {
        self.state.lock().await.failing_files.insert(file.to_string());
    }

    /// Make moving `tid` fail as if the thread did not exist
    pub async fn reject_thread(&self, tid: ThreadId) {
        self.state.lock().await.rejected_threads.insert(tid);
    }

    /// Make the next `count` group removals fail with `Internal`
    pub async fn fail_next_removals(&self, count: usize) {
        self.state.lock().await.failing_removals = count;
    }

    /// Drop all threads from a group (for testing)
    pub async fn clear_threads(&self, resource: ResourceType, name: &ContainerName) {
        if let Some(group) = self
            .state
            .lock()
            .await
            .groups
            .get_mut(&(resource, name.clone()))
        {
            group.threads.clear();
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend").finish_non_exhaustive()
    }
}

impl MockState {
    fn group(&self, resource: ResourceType, name: &ContainerName) -> Result<&MockGroup> {
        self.groups
            .get(&(resource, name.clone()))
            .ok_or_else(|| Error::not_found(format!("{resource} group {name} does not exist")))
    }

    fn group_mut(&mut self, resource: ResourceType, name: &ContainerName) -> Result<&mut MockGroup> {
        self.groups
            .get_mut(&(resource, name.clone()))
            .ok_or_else(|| Error::not_found(format!("{resource} group {name} does not exist")))
    }
}

impl MockGroup {
    fn seeded(resource: ResourceType) -> Self {
        let files: &[(&str, &str)] = match resource {
            ResourceType::Cpu => &[
                ("cpu.max", "max 100000"),
                ("cpu.weight", "100"),
                (
                    "cpu.stat",
                    "usage_usec 0\nuser_usec 0\nsystem_usec 0\nnr_periods 0\nnr_throttled 0\nthrottled_usec 0",
                ),
            ],
            ResourceType::Memory => &[
                ("memory.max", "max"),
                ("memory.low", "0"),
                ("memory.swap.max", "max"),
                ("memory.current", "0"),
                ("memory.peak", "0"),
                ("memory.swap.current", "0"),
                ("memory.stat", "anon 0\nfile 0"),
                ("memory.events", "low 0\nhigh 0\nmax 0\noom 0\noom_kill 0"),
            ],
            ResourceType::DiskIo => &[("io.weight", "default 100"), ("io.max", ""), ("io.stat", "")],
            ResourceType::Network => &[("net_cls.classid", "0"), ("net_prio.ifpriomap", "")],
            ResourceType::Monitoring => &[
                ("cgroup.pressure", "1"),
                (
                    "cpu.pressure",
                    "some avg10=0.00 avg60=0.00 avg300=0.00 total=0\nfull avg10=0.00 avg60=0.00 avg300=0.00 total=0",
                ),
                (
                    "memory.pressure",
                    "some avg10=0.00 avg60=0.00 avg300=0.00 total=0\nfull avg10=0.00 avg60=0.00 avg300=0.00 total=0",
                ),
                (
                    "io.pressure",
                    "some avg10=0.00 avg60=0.00 avg300=0.00 total=0\nfull avg10=0.00 avg60=0.00 avg300=0.00 total=0",
                ),
            ],
            ResourceType::Global => &[("pids.max", "max"), ("cgroup.freeze", "0")],
        };

        Self {
            files: files
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            threads: Vec::new(),
        }
    }

    fn read(&self, file: &str) -> Option<String> {
        match file {
            THREADS_FILE | "cgroup.procs" => Some(
                self.threads
                    .iter()
                    .map(|t| format!("{t}\n"))
                    .collect::<String>(),
            ),
            EVENTS_FILE => {
                let frozen = self.files.get("cgroup.freeze").map_or("0", |v| v.trim());
                Some(format!(
                    "populated {}\nfrozen {frozen}\n",
                    u8::from(!self.threads.is_empty())
                ))
            }
            "pids.current" if !self.files.contains_key(file) => {
                Some(self.threads.len().to_string())
            }
            _ => self.files.get(file).cloned(),
        }
    }

    fn write(&mut self, file: &str, value: &str) {
        let value = value.trim();
        match file {
            // one line per device, `max` in both directions drops the line
            "io.max" => {
                let device = value.split_whitespace().next().unwrap_or_default();
                let unlimited = value
                    .split_whitespace()
                    .skip(1)
                    .all(|kv| kv.ends_with("=max"));
                let mut lines: Vec<String> = self
                    .files
                    .get(file)
                    .map(|c| c.lines().map(str::to_string).collect())
                    .unwrap_or_default();
                lines.retain(|l| l.split_whitespace().next() != Some(device));
                if !unlimited {
                    lines.push(value.to_string());
                }
                lines.sort();
                self.files.insert(file.to_string(), lines.join("\n"));
            }
            // `<iface> <prio>`, priority 0 drops the entry
            "net_prio.ifpriomap" => {
                let mut parts = value.split_whitespace();
                let iface = parts.next().unwrap_or_default();
                let prio = parts.next().unwrap_or("0");
                let mut lines: Vec<String> = self
                    .files
                    .get(file)
                    .map(|c| c.lines().map(str::to_string).collect())
                    .unwrap_or_default();
                lines.retain(|l| l.split_whitespace().next() != Some(iface));
                if prio != "0" {
                    lines.push(format!("{iface} {prio}"));
                }
                lines.sort();
                self.files.insert(file.to_string(), lines.join("\n"));
            }
            "io.weight" => {
                let weight = value.strip_prefix("default ").unwrap_or(value);
                self.files
                    .insert(file.to_string(), format!("default {weight}"));
            }
            _ => {
                self.files.insert(file.to_string(), value.to_string());
            }
        }
    }
}

#[async_trait]
impl GroupBackend for MockBackend {
    async fn init_hierarchy(&self, resource: ResourceType, controllers: &[String]) -> Result<bool> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.call_count += 1;

        let changed = match state.hierarchies.get_mut(&resource) {
            Some(enabled) => {
                let missing: Vec<String> = controllers
                    .iter()
                    .filter(|c| !enabled.contains(c))
                    .cloned()
                    .collect();
                let changed = !missing.is_empty();
                enabled.extend(missing);
                changed
            }
            None => {
                state.hierarchies.insert(resource, controllers.to_vec());
                state
                    .groups
                    .insert((resource, ContainerName::root()), MockGroup::seeded(resource));
                true
            }
        };

        if changed {
            state.init_steps += 1;
        }

        tracing::debug!(%resource, changed, "Mock: Init hierarchy");

        Ok(changed)
    }

    async fn create_group(&self, resource: ResourceType, name: &ContainerName) -> Result<()> {
        let mut state = self.state.lock().await;
        state.call_count += 1;

        if state.groups.contains_key(&(resource, name.clone())) {
            return Err(Error::already_exists(format!(
                "{resource} group {name} already exists"
            )));
        }

        let parent = name
            .parent()
            .ok_or_else(|| Error::not_found(format!("{resource} hierarchy is not initialized")))?;
        if !state.groups.contains_key(&(resource, parent.clone())) {
            return Err(Error::not_found(format!(
                "parent {resource} group {parent} does not exist"
            )));
        }

        state
            .groups
            .insert((resource, name.clone()), MockGroup::seeded(resource));

        tracing::debug!(%resource, container = %name, "Mock: Created group");

        Ok(())
    }

    async fn remove_group(&self, resource: ResourceType, name: &ContainerName) -> Result<()> {
        let mut state = self.state.lock().await;
        state.call_count += 1;

        if state.failing_removals > 0 {
            state.failing_removals -= 1;
            return Err(Error::internal(format!(
                "injected failure removing {resource} group {name}"
            )));
        }

        let group = state.group(resource, name)?;
        if !group.threads.is_empty() {
            return Err(Error::failed_precondition(format!(
                "{resource} group {name} still has {} threads",
                group.threads.len()
            )));
        }

        let has_children = state
            .groups
            .keys()
            .any(|(r, n)| *r == resource && n.parent().as_ref() == Some(name));
        if has_children {
            return Err(Error::failed_precondition(format!(
                "{resource} group {name} has child groups"
            )));
        }

        state.groups.remove(&(resource, name.clone()));

        tracing::debug!(%resource, container = %name, "Mock: Removed group");

        Ok(())
    }

    async fn group_exists(&self, resource: ResourceType, name: &ContainerName) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.call_count += 1;
        Ok(state.groups.contains_key(&(resource, name.clone())))
    }

    async fn read(
        &self,
        resource: ResourceType,
        name: &ContainerName,
        file: &str,
    ) -> Result<String> {
        let mut state = self.state.lock().await;
        state.call_count += 1;

        state
            .group(resource, name)?
            .read(file)
            .ok_or_else(|| Error::not_found(format!("{file} does not exist in {name}")))
    }

    async fn write(
        &self,
        resource: ResourceType,
        name: &ContainerName,
        file: &str,
        value: &str,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.call_count += 1;

        if state.failing_files.contains(file) {
            return Err(Error::internal(format!("injected failure writing {file}")));
        }

        state.group_mut(resource, name)?.write(file, value);

        tracing::trace!(%resource, container = %name, file, value, "Mock: Wrote file");

        Ok(())
    }

    async fn move_thread(
        &self,
        resource: ResourceType,
        name: &ContainerName,
        tid: ThreadId,
    ) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.call_count += 1;

        if state.rejected_threads.contains(&tid) {
            return Err(Error::not_found(format!("thread {tid} does not exist")));
        }

        state.group_mut(resource, name)?;

        // a thread lives in exactly one group per hierarchy
        for ((r, _), group) in &mut state.groups {
            if *r == resource {
                group.threads.retain(|t| *t != tid);
            }
        }
        let group = state.group_mut(resource, name)?;
        group.threads.push(tid);

        tracing::debug!(
            %resource,
            container = %name,
            tid = tid.as_raw(),
            total_threads = group.threads.len(),
            "Mock: Moved thread"
        );

        Ok(())
    }
}
