//! Core type definitions with strong typing and validation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Error, Result};

/// Absolute, hierarchical container name such as `/batch/job1`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerName(String);

impl ContainerName {
    /// Maximum length of a single path component
    pub const MAX_COMPONENT_LENGTH: usize = 64;

    /// Create a new `ContainerName` with validation
    ///
    /// # Errors
    /// Returns `InvalidArgument` if the name is not absolute, has empty or
    /// dot components, or contains characters outside `[A-Za-z0-9_.-]`
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// The root container `/`
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    fn validate(name: &str) -> Result<()> {
        let Some(rest) = name.strip_prefix('/') else {
            return Err(Error::invalid_argument(format!(
                "container name {name:?} must be absolute"
            )));
        };

        if rest.is_empty() {
            return Ok(());
        }

        for component in rest.split('/') {
            if component.is_empty() || component == "." || component == ".." {
                return Err(Error::invalid_argument(format!(
                    "container name {name:?} has an empty or relative component"
                )));
            }

            if component.len() > Self::MAX_COMPONENT_LENGTH {
                return Err(Error::invalid_argument(format!(
                    "container name component too long (max {} chars)",
                    Self::MAX_COMPONENT_LENGTH
                )));
            }

            if !component
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            {
                return Err(Error::invalid_argument(format!(
                    "container name {name:?} can only contain alphanumeric, dash, underscore and dot"
                )));
            }
        }

        Ok(())
    }

    /// Get the container name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the root container
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Path components below the root
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// Parent container, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Path of this container relative to a hierarchy root
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        self.components().collect()
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContainerName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContainerName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ContainerName> for String {
    fn from(name: ContainerName) -> Self {
        name.0
    }
}

/// Kernel thread identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ThreadId(i32);

impl ThreadId {
    /// Create from raw TID
    #[must_use]
    pub const fn from_raw(tid: i32) -> Self {
        Self(tid)
    }

    /// The calling thread
    #[must_use]
    pub fn current() -> Self {
        Self(nix::unistd::gettid().as_raw())
    }

    /// Get raw TID value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ThreadId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let tid: i32 = s
            .trim()
            .parse()
            .map_err(|_| Error::invalid_argument(format!("invalid thread id {s:?}")))?;
        if tid <= 0 {
            return Err(Error::invalid_argument(format!("invalid thread id {tid}")));
        }
        Ok(Self(tid))
    }
}

impl From<nix::unistd::Pid> for ThreadId {
    fn from(pid: nix::unistd::Pid) -> Self {
        Self(pid.as_raw())
    }
}

/// Opaque handle for one active subscription; only meaningful to the
/// handler that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct NotificationId(u64);

impl NotificationId {
    /// Wrap a raw id
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Raw id value
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
