//! The factory/handler contract every resource type implements

use async_trait::async_trait;
use std::fmt;

use corral_core::{
    ContainerName, ContainerSpec, ContainerStats, EventSpec, InitSpec, NotificationId,
    ResourceType, Result, StatsType, ThreadId, UpdatePolicy,
};

/// Callback owned by a subscription
///
/// Invoked with `Ok(())` each time the event fires, or once with the error
/// that stopped the subscription. It runs on a background task while the
/// subscription table is locked, so it must return quickly.
pub type NotificationCallback = Box<dyn FnMut(Result<()>) + Send>;

/// Lifecycle of a handler
///
/// ```text
/// Created --create()--> Active --destroy()--> Destroyed
///                        |  ^
///                        +--+ update/stats/spec/enter/notify, failed destroy
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerState {
    /// Constructed for a new container, setup not yet run
    Created,
    /// Usable
    Active,
    /// Terminal; every operation fails
    Destroyed,
}

impl fmt::Display for HandlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Active => write!(f, "active"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Live resource management for one (container, resource type) pair
///
/// Every operation may touch the kernel and is awaited to completion by the
/// caller; there are no built-in timeouts. Calls on the same handler are
/// serialized through `&mut self` where they change handler state. Callers
/// must not run `create`/`get`/`destroy` for the same pair concurrently
/// through different handles.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Absolute name of the container this handler manages
    fn container_name(&self) -> &ContainerName;

    /// Resource type this handler manages
    fn resource_type(&self) -> ResourceType;

    /// Current lifecycle state
    fn state(&self) -> HandlerState;

    /// One-time setup right after the factory built a new handler
    ///
    /// Applies this resource's section of `spec`, if present.
    ///
    /// # Errors
    /// `FailedPrecondition` unless the handler is [`HandlerState::Created`],
    /// `InvalidArgument` if the section is malformed
    async fn create(&mut self, spec: &ContainerSpec) -> Result<()>;

    /// Reconcile live state with this resource's section of `spec`
    ///
    /// [`UpdatePolicy::Diff`] writes only the fields present.
    /// [`UpdatePolicy::Replace`] resets every unmentioned field to its default.
    /// On a failed write the first error is returned; writes that do not
    /// depend on the failed one are still applied.
    async fn update(&mut self, spec: &ContainerSpec, policy: UpdatePolicy) -> Result<()>;

    /// Fill this resource's section of `output`
    async fn stats(&self, stats_type: StatsType, output: &mut ContainerStats) -> Result<()>;

    /// Fill this resource's section of `output` from live state
    async fn spec(&self, output: &mut ContainerSpec) -> Result<()>;

    /// Move threads into this resource's group
    ///
    /// Stops at the first failure. Threads already moved stay moved.
    async fn enter(&self, tids: &[ThreadId]) -> Result<()>;

    /// Release the group and every subscription
    ///
    /// On success the handler is [`HandlerState::Destroyed`] and the caller
    /// should drop it. On failure it stays active and `destroy` may be
    /// retried.
    async fn destroy(&mut self) -> Result<()>;

    /// Subscribe `callback` to the single event named by `spec`
    ///
    /// # Errors
    /// `InvalidArgument` unless `spec` names exactly one event kind,
    /// `NotFound` if this resource does not serve that event
    async fn register_notification(
        &mut self,
        spec: &EventSpec,
        callback: NotificationCallback,
    ) -> Result<NotificationId>;

    /// Remove a subscription, dropping its callback
    ///
    /// # Errors
    /// `NotFound` if `id` is not an active subscription of this handler
    async fn unregister_notification(&mut self, id: NotificationId) -> Result<()>;

    /// Number of live subscriptions
    fn active_notifications(&self) -> usize;
}

/// Process-wide creator and locator of handlers for one resource type
#[async_trait]
pub trait ResourceHandlerFactory: Send + Sync {
    /// Resource type served by this factory
    fn resource_type(&self) -> ResourceType;

    /// Attach to an existing container
    ///
    /// # Errors
    /// `NotFound` if this resource has no state for `name`
    async fn get(&self, name: &ContainerName) -> Result<Box<dyn ResourceHandler>>;

    /// Set up this resource for a new container
    ///
    /// Only this resource's section of `spec` is read.
    ///
    /// # Errors
    /// `AlreadyExists` if state for `name` exists, `InvalidArgument` if the
    /// section is malformed
    async fn create(
        &self,
        name: &ContainerName,
        spec: &ContainerSpec,
    ) -> Result<Box<dyn ResourceHandler>>;

    /// Machine-wide bootstrap; repeating it with an equivalent spec is a
    /// no-op
    async fn init_machine(&self, spec: &InitSpec) -> Result<()>;
}
