//! Generic handler and factory over a [`GroupBackend`]
//!
//! One implementation serves every resource type; the [`Resource`]
//! parameter supplies the per-type knobs, parsers and probes.

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use corral_cgroup::GroupBackend;
use corral_core::{
    ContainerName, ContainerSpec, ContainerStats, Error, EventSpec, InitSpec, NotificationId,
    ResourceType, Result, SpecSection, StatsType, ThreadId, UpdatePolicy,
};

use crate::handler::{HandlerState, NotificationCallback, ResourceHandler, ResourceHandlerFactory};
use crate::notify::NotificationTable;
use crate::resource::{Group, Resource};

/// Handler for one container in the hierarchy of `R`
pub struct CgroupHandler<R: Resource> {
    group: Group,
    state: HandlerState,
    notifications: NotificationTable,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> CgroupHandler<R> {
    fn new(group: Group, state: HandlerState, poll_interval: Duration) -> Self {
        Self {
            group,
            state,
            notifications: NotificationTable::new(poll_interval),
            _resource: PhantomData,
        }
    }

    fn ensure_active(&self, operation: &str) -> Result<()> {
        match self.state {
            HandlerState::Active => Ok(()),
            state => Err(Error::failed_precondition(format!(
                "cannot {operation} {} handler of {} in state {state}",
                R::TYPE,
                self.group.name()
            ))),
        }
    }
}

impl<R: Resource> std::fmt::Debug for CgroupHandler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CgroupHandler")
            .field("resource", &R::TYPE)
            .field("container", self.group.name())
            .field("state", &self.state)
            .field("notifications", &self.notifications)
            .finish()
    }
}

#[async_trait]
impl<R: Resource> ResourceHandler for CgroupHandler<R> {
    fn container_name(&self) -> &ContainerName {
        self.group.name()
    }

    fn resource_type(&self) -> ResourceType {
        R::TYPE
    }

    fn state(&self) -> HandlerState {
        self.state
    }

    async fn create(&mut self, spec: &ContainerSpec) -> Result<()> {
        if self.state != HandlerState::Created {
            return Err(Error::failed_precondition(format!(
                "{} handler of {} is already {}",
                R::TYPE,
                self.group.name(),
                self.state
            )));
        }

        if let Some(section) = R::section(spec) {
            R::validate(section)?;
            self.group.apply(R::knobs(section, None)).await?;
        }

        self.state = HandlerState::Active;

        debug!(resource = %R::TYPE, container = %self.group.name(), "Handler active");

        Ok(())
    }

    async fn update(&mut self, spec: &ContainerSpec, policy: UpdatePolicy) -> Result<()> {
        self.ensure_active("update")?;

        let knobs = match policy {
            UpdatePolicy::Diff => {
                let Some(section) = R::section(spec) else {
                    return Ok(());
                };
                R::validate(section)?;
                R::knobs(section, None)
            }
            UpdatePolicy::Replace => {
                let target = R::section(spec).cloned().unwrap_or_default().with_defaults();
                R::validate(&target)?;
                let live = R::read_spec(&self.group).await?;
                R::knobs(&target, Some(&live))
            }
        };

        debug!(
            resource = %R::TYPE,
            container = %self.group.name(),
            ?policy,
            writes = knobs.len(),
            "Updating"
        );

        self.group.apply(knobs).await
    }

    async fn stats(&self, stats_type: StatsType, output: &mut ContainerStats) -> Result<()> {
        self.ensure_active("read stats of")?;
        let stats = R::read_stats(&self.group, stats_type).await?;
        R::store_stats(output, stats);
        Ok(())
    }

    async fn spec(&self, output: &mut ContainerSpec) -> Result<()> {
        self.ensure_active("read spec of")?;
        let section = R::read_spec(&self.group).await?;
        R::store(output, section);
        Ok(())
    }

    async fn enter(&self, tids: &[ThreadId]) -> Result<()> {
        self.ensure_active("enter")?;

        for &tid in tids {
            self.group.move_thread(tid).await.map_err(|e| {
                e.context(format!(
                    "enter thread {tid} into {} {}",
                    R::TYPE,
                    self.group.name()
                ))
            })?;
        }

        debug!(
            resource = %R::TYPE,
            container = %self.group.name(),
            threads = tids.len(),
            "Threads entered"
        );

        Ok(())
    }

    async fn destroy(&mut self) -> Result<()> {
        self.ensure_active("destroy")?;

        // subscriptions survive a failed removal
        let group = &self.group;
        if let Err(e) = self.notifications.clear_after(|| group.remove()).await {
            warn!(
                resource = %R::TYPE,
                container = %self.group.name(),
                error = %e,
                "Destroy failed"
            );
            return Err(e.context(format!("destroy {} {}", R::TYPE, self.group.name())));
        }

        self.state = HandlerState::Destroyed;

        info!(resource = %R::TYPE, container = %self.group.name(), "Destroyed");

        Ok(())
    }

    async fn register_notification(
        &mut self,
        spec: &EventSpec,
        callback: NotificationCallback,
    ) -> Result<NotificationId> {
        self.ensure_active("register notification on")?;

        let kind = spec.kind()?;
        let probe = R::probe(kind)?;

        Ok(self
            .notifications
            .insert(self.group.clone(), kind, probe, callback)
            .await)
    }

    async fn unregister_notification(&mut self, id: NotificationId) -> Result<()> {
        self.ensure_active("unregister notification on")?;
        self.notifications.remove(id).await
    }

    fn active_notifications(&self) -> usize {
        self.notifications.len()
    }
}

/// Factory for [`CgroupHandler<R>`]
pub struct CgroupHandlerFactory<R: Resource> {
    backend: Arc<dyn GroupBackend>,
    poll_interval: Duration,
    initialized: Mutex<Option<Vec<String>>>,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> CgroupHandlerFactory<R> {
    /// Create a factory over `backend`
    #[must_use]
    pub fn new(backend: Arc<dyn GroupBackend>, poll_interval: Duration) -> Self {
        Self {
            backend,
            poll_interval,
            initialized: Mutex::new(None),
            _resource: PhantomData,
        }
    }

    fn group(&self, name: &ContainerName) -> Group {
        Group::new(Arc::clone(&self.backend), R::TYPE, name.clone())
    }

    fn controllers(spec: &InitSpec) -> Vec<String> {
        let mut controllers: Vec<String> = spec.hierarchy(R::TYPE).map_or_else(
            || R::CONTROLLERS.iter().map(ToString::to_string).collect(),
            |h| h.controllers.clone(),
        );
        controllers.sort();
        controllers.dedup();
        controllers
    }
}

impl<R: Resource> std::fmt::Debug for CgroupHandlerFactory<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CgroupHandlerFactory")
            .field("resource", &R::TYPE)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<R: Resource> ResourceHandlerFactory for CgroupHandlerFactory<R> {
    fn resource_type(&self) -> ResourceType {
        R::TYPE
    }

    async fn get(&self, name: &ContainerName) -> Result<Box<dyn ResourceHandler>> {
        if !self.backend.group_exists(R::TYPE, name).await? {
            return Err(Error::not_found(format!("no {} state for {name}", R::TYPE)));
        }

        debug!(resource = %R::TYPE, container = %name, "Attached handler");

        Ok(Box::new(CgroupHandler::<R>::new(
            self.group(name),
            HandlerState::Active,
            self.poll_interval,
        )))
    }

    async fn create(
        &self,
        name: &ContainerName,
        spec: &ContainerSpec,
    ) -> Result<Box<dyn ResourceHandler>> {
        if let Some(section) = R::section(spec) {
            R::validate(section)?;
        }

        if self.backend.group_exists(R::TYPE, name).await? {
            return Err(Error::already_exists(format!(
                "{} state for {name} already exists",
                R::TYPE
            )));
        }

        self.backend.create_group(R::TYPE, name).await?;

        let mut handler =
            CgroupHandler::<R>::new(self.group(name), HandlerState::Created, self.poll_interval);

        if let Err(e) = handler.create(spec).await {
            warn!(resource = %R::TYPE, container = %name, error = %e, "Create failed, rolling back");
            if let Err(cleanup) = self.backend.remove_group(R::TYPE, name).await {
                warn!(
                    resource = %R::TYPE,
                    container = %name,
                    error = %cleanup,
                    "Rollback failed"
                );
            }
            return Err(e);
        }

        info!(resource = %R::TYPE, container = %name, "Created");

        Ok(Box::new(handler))
    }

    async fn init_machine(&self, spec: &InitSpec) -> Result<()> {
        let controllers = Self::controllers(spec);
        let mut initialized = self.initialized.lock().await;

        if let Some(applied) = initialized.as_ref() {
            if *applied == controllers {
                debug!(resource = %R::TYPE, "Machine already initialized");
                return Ok(());
            }
            return Err(Error::failed_precondition(format!(
                "{} hierarchy already initialized with controllers {applied:?}, not {controllers:?}",
                R::TYPE
            )));
        }

        let changed = self.backend.init_hierarchy(R::TYPE, &controllers).await?;
        if changed {
            info!(resource = %R::TYPE, ?controllers, "Hierarchy initialized");
        } else {
            debug!(resource = %R::TYPE, "Hierarchy already in place");
        }

        *initialized = Some(controllers);

        Ok(())
    }
}
