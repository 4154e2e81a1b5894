//! Filesystem backend writing cgroup interface files
//!
//! Each resource type owns one hierarchy directory under the configured
//! root, e.g. `/sys/fs/cgroup/memory/batch/job1` for the memory group of
//! container `/batch/job1`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use corral_core::{ContainerName, Error, ResourceType, Result, ThreadId};

use crate::backend::{GroupBackend, THREADS_FILE};
use crate::config::CgroupConfig;

const SUBTREE_CONTROL: &str = "cgroup.subtree_control";

/// cgroup filesystem backend
#[derive(Debug, Clone)]
pub struct CgroupFs {
    config: CgroupConfig,
}

impl CgroupFs {
    /// Create a backend rooted at `config.root`
    #[must_use]
    pub const fn new(config: CgroupConfig) -> Self {
        Self { config }
    }

    /// Directory of the hierarchy owned by `resource`
    #[must_use]
    pub fn hierarchy_path(&self, resource: ResourceType) -> PathBuf {
        self.config.root.join(self.config.hierarchy(resource))
    }

    /// Directory of one group
    #[must_use]
    pub fn group_path(&self, resource: ResourceType, name: &ContainerName) -> PathBuf {
        self.hierarchy_path(resource).join(name.relative_path())
    }

    /// Enable missing controllers in `dir`
    ///
    /// Returns whether anything was written. A permission error is tolerated:
    /// controllers may be managed at a higher level.
    async fn enable_controllers(dir: &Path, controllers: &[String]) -> Result<bool> {
        let control_file = dir.join(SUBTREE_CONTROL);

        let current = match fs::read_to_string(&control_file).await {
            Ok(current) => current,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Control file does not exist, skipping controller setup");
                return Ok(false);
            }
            Err(e) => {
                return Err(Error::from(e).context(format!("read {}", control_file.display())));
            }
        };
        let enabled: Vec<&str> = current.split_whitespace().collect();

        let missing: Vec<&String> = controllers
            .iter()
            .filter(|c| !enabled.contains(&c.as_str()))
            .collect();

        if missing.is_empty() {
            debug!("All required controllers already enabled in {}", dir.display());
            return Ok(false);
        }

        let mut changed = false;
        for controller in missing {
            match write_existing(&control_file, &format!("+{controller}")).await {
                Ok(()) => changed = true,
                Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                    debug!(
                        "Could not enable {} in {} (may be OK): {}",
                        controller,
                        dir.display(),
                        e
                    );
                }
                Err(e) => {
                    return Err(Error::from(e)
                        .context(format!("enable {controller} in {}", dir.display())));
                }
            }
        }

        Ok(changed)
    }
}

/// Write to an interface file without creating it
async fn write_existing(path: &Path, data: &str) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(false)
        .write(true)
        .truncate(true)
        .open(path)
        .await?;
    file.write_all(data.as_bytes()).await?;
    file.flush().await
}

#[async_trait]
impl GroupBackend for CgroupFs {
    async fn init_hierarchy(&self, resource: ResourceType, controllers: &[String]) -> Result<bool> {
        let dir = self.hierarchy_path(resource);

        let created = if fs::try_exists(&dir).await? {
            debug!(%resource, "Hierarchy already present at {}", dir.display());
            false
        } else {
            debug!(%resource, "Creating hierarchy at {}", dir.display());
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| Error::from(e).context(format!("create {}", dir.display())))?;
            true
        };

        let enabled = Self::enable_controllers(&dir, controllers).await?;

        Ok(created || enabled)
    }

    async fn create_group(&self, resource: ResourceType, name: &ContainerName) -> Result<()> {
        let path = self.group_path(resource, name);

        if fs::try_exists(&path).await? {
            return Err(Error::already_exists(format!(
                "{resource} group {name} already exists"
            )));
        }

        let parent = path
            .parent()
            .ok_or_else(|| Error::invalid_argument("Invalid cgroup path"))?;
        if !fs::try_exists(parent).await? {
            return Err(Error::not_found(format!(
                "parent of {resource} group {name} does not exist"
            )));
        }

        debug!(%resource, container = %name, "Creating cgroup directory: {}", path.display());

        fs::create_dir(&path)
            .await
            .map_err(|e| Error::from(e).context(format!("create {}", path.display())))
    }

    async fn remove_group(&self, resource: ResourceType, name: &ContainerName) -> Result<()> {
        let path = self.group_path(resource, name);

        debug!(%resource, container = %name, "Removing cgroup directory: {}", path.display());

        fs::remove_dir(&path)
            .await
            .map_err(|e| Error::from(e).context(format!("remove {}", path.display())))
    }

    async fn group_exists(&self, resource: ResourceType, name: &ContainerName) -> Result<bool> {
        Ok(fs::try_exists(self.group_path(resource, name)).await?)
    }

    async fn read(
        &self,
        resource: ResourceType,
        name: &ContainerName,
        file: &str,
    ) -> Result<String> {
        let path = self.group_path(resource, name).join(file);
        fs::read_to_string(&path)
            .await
            .map_err(|e| Error::from(e).context(format!("read {}", path.display())))
    }

    async fn write(
        &self,
        resource: ResourceType,
        name: &ContainerName,
        file: &str,
        value: &str,
    ) -> Result<()> {
        let path = self.group_path(resource, name).join(file);

        debug!(%resource, container = %name, file, value, "Writing cgroup file");

        write_existing(&path, value)
            .await
            .map_err(|e| Error::from(e).context(format!("write {}", path.display())))
    }

    async fn move_thread(
        &self,
        resource: ResourceType,
        name: &ContainerName,
        tid: ThreadId,
    ) -> Result<()> {
        let path = self.group_path(resource, name).join(THREADS_FILE);

        debug!(%resource, container = %name, tid = tid.as_raw(), "Moving thread into cgroup");

        write_existing(&path, &tid.to_string())
            .await
            .map_err(|e| Error::from(e).context(format!("move thread {tid} into {name}")))
    }
}
