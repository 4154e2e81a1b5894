//! Notification subscriptions
//!
//! Each subscription owns a [`Probe`] polled by its own background task.
//! Callbacks live in a table shared with the pollers; delivery happens with
//! the table locked, so removing an entry and invoking its callback never
//! overlap and every callback is dropped exactly once.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use corral_cgroup::MIN_POLL_INTERVAL;
use corral_core::{Error, EventKind, NotificationId, Result};

use crate::handler::NotificationCallback;
use crate::parse::{parse_flat_keyed, parse_pressure, parse_u64};
use crate::resource::Group;

/// Condition watched by one subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Fires whenever `key` of a flat keyed file grows
    Counter {
        /// File to poll
        file: &'static str,
        /// Counter name
        key: &'static str,
        /// Last value seen
        last: Option<u64>,
    },
    /// Fires when a single-value file reaches `threshold`, re-arms below it
    Threshold {
        /// File to poll
        file: &'static str,
        /// Level to watch
        threshold: u64,
        /// Whether the next crossing fires
        armed: bool,
    },
    /// Fires when the `some total` of a PSI file grows by `stall_us` between
    /// two polls
    Stall {
        /// File to poll
        file: &'static str,
        /// Minimum growth in microseconds
        stall_us: u64,
        /// Last total seen
        last: Option<u64>,
    },
    /// Fires once when `populated` drops from 1 to 0
    Drained {
        /// File to poll
        file: &'static str,
        /// Last state seen
        populated: Option<bool>,
    },
}

impl Probe {
    /// Watch a growing counter
    #[must_use]
    pub const fn counter(file: &'static str, key: &'static str) -> Self {
        Self::Counter {
            file,
            key,
            last: None,
        }
    }

    /// Watch a level with re-arm
    #[must_use]
    pub const fn threshold(file: &'static str, threshold: u64) -> Self {
        Self::Threshold {
            file,
            threshold,
            armed: true,
        }
    }

    /// Watch stall time growth
    #[must_use]
    pub const fn stall(file: &'static str, stall_us: u64) -> Self {
        Self::Stall {
            file,
            stall_us,
            last: None,
        }
    }

    /// Watch for the group emptying
    #[must_use]
    pub const fn drained(file: &'static str) -> Self {
        Self::Drained {
            file,
            populated: None,
        }
    }

    /// File this probe polls
    #[must_use]
    pub const fn file(&self) -> &'static str {
        match self {
            Self::Counter { file, .. }
            | Self::Threshold { file, .. }
            | Self::Stall { file, .. }
            | Self::Drained { file, .. } => file,
        }
    }

    /// Whether the probe is done after firing once
    #[must_use]
    pub const fn is_edge(&self) -> bool {
        matches!(self, Self::Drained { .. })
    }

    /// Feed one reading; returns whether the event fired
    pub fn observe(&mut self, content: &str) -> Result<bool> {
        match self {
            Self::Counter { file, key, last } => {
                let value = parse_flat_keyed(content)
                    .get(*key)
                    .copied()
                    .ok_or_else(|| Error::internal(format!("no {key} in {file}")))?;
                let fired = last.is_some_and(|prev| value > prev);
                *last = Some(value);
                Ok(fired)
            }
            Self::Threshold {
                file,
                threshold,
                armed,
            } => {
                let value = parse_u64(file, content)?;
                if *armed && value >= *threshold {
                    *armed = false;
                    Ok(true)
                } else {
                    if value < *threshold {
                        *armed = true;
                    }
                    Ok(false)
                }
            }
            Self::Stall {
                file,
                stall_us,
                last,
            } => {
                let total = parse_pressure(file, content)?.some.total_us;
                let fired = last.is_some_and(|prev| total.saturating_sub(prev) >= *stall_us);
                *last = Some(total);
                Ok(fired)
            }
            Self::Drained { file, populated } => {
                let now = parse_flat_keyed(content)
                    .get("populated")
                    .map(|v| *v != 0)
                    .ok_or_else(|| Error::internal(format!("no populated in {file}")))?;
                let fired = *populated == Some(true) && !now;
                *populated = Some(now);
                Ok(fired)
            }
        }
    }
}

type Callbacks = Arc<Mutex<HashMap<NotificationId, NotificationCallback>>>;

/// Per-handler subscription table
pub struct NotificationTable {
    callbacks: Callbacks,
    pollers: HashMap<NotificationId, (EventKind, JoinHandle<()>)>,
    next_id: u64,
    poll_interval: Duration,
}

impl NotificationTable {
    /// Create an empty table whose pollers tick every `poll_interval`
    ///
    /// Intervals below [`MIN_POLL_INTERVAL`] are raised to it.
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            pollers: HashMap::new(),
            next_id: 1,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Number of live subscriptions
    #[must_use]
    pub fn len(&self) -> usize {
        self.pollers.len()
    }

    /// Whether no subscription is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pollers.is_empty()
    }

    /// Add a subscription and start polling for it
    pub async fn insert(
        &mut self,
        group: Group,
        kind: EventKind,
        probe: Probe,
        callback: NotificationCallback,
    ) -> NotificationId {
        let id = NotificationId::from_raw(self.next_id);
        self.next_id += 1;

        self.callbacks.lock().await.insert(id, callback);

        info!(
            resource = %group.resource(),
            container = %group.name(),
            notification = %id,
            event = %kind,
            "Notification registered"
        );

        let task = tokio::spawn(poll(
            group,
            probe,
            id,
            Arc::clone(&self.callbacks),
            self.poll_interval,
        ));
        self.pollers.insert(id, (kind, task));

        id
    }

    /// Remove a subscription, dropping its callback
    ///
    /// # Errors
    /// `NotFound` if `id` is not live
    pub async fn remove(&mut self, id: NotificationId) -> Result<()> {
        let (kind, task) = self
            .pollers
            .remove(&id)
            .ok_or_else(|| Error::not_found(format!("no active notification {id}")))?;

        // waits for an in-flight delivery to finish
        let callback = self.callbacks.lock().await.remove(&id);
        task.abort();
        drop(callback);

        debug!(notification = %id, event = %kind, "Notification removed");

        Ok(())
    }

    /// Run `teardown` with delivery held, then remove every subscription
    ///
    /// If `teardown` fails its error is returned and all subscriptions stay
    /// live. Pollers that observed the teardown find their entry gone and
    /// stop without delivering.
    pub async fn clear_after<F, Fut>(&mut self, teardown: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        let mut callbacks = self.callbacks.lock().await;

        teardown().await?;

        let mut released = Vec::with_capacity(self.pollers.len());
        for (id, (kind, task)) in self.pollers.drain() {
            task.abort();
            released.extend(callbacks.remove(&id));
            debug!(notification = %id, event = %kind, "Notification removed");
        }
        drop(callbacks);
        drop(released);

        Ok(())
    }
}

impl Drop for NotificationTable {
    fn drop(&mut self) {
        for (_, task) in self.pollers.values() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for NotificationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationTable")
            .field("active", &self.pollers.len())
            .field("next_id", &self.next_id)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Poll one probe until it finishes, fails, or its entry disappears
async fn poll(
    group: Group,
    mut probe: Probe,
    id: NotificationId,
    callbacks: Callbacks,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let observed = match group.read(probe.file()).await {
            Ok(content) => probe.observe(&content),
            Err(e) => Err(e),
        };

        let (result, last) = match observed {
            Ok(false) => continue,
            Ok(true) => (Ok(()), probe.is_edge()),
            Err(e) => {
                warn!(
                    resource = %group.resource(),
                    container = %group.name(),
                    notification = %id,
                    error = %e,
                    "Notification probe failed"
                );
                (Err(e), true)
            }
        };

        let mut callbacks = callbacks.lock().await;
        let Some(callback) = callbacks.get_mut(&id) else {
            break;
        };

        debug!(
            resource = %group.resource(),
            container = %group.name(),
            notification = %id,
            "Delivering notification"
        );
        callback(result);

        if last {
            break;
        }
    }
}
