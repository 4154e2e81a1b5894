//! Resource-group backends for corral
//!
//! This crate provides the OS boundary resource handlers talk to: a
//! trait-based abstraction over cgroup-style hierarchies with a filesystem
//! implementation and an in-memory mock.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod backend;
pub mod config;
pub mod fs;

pub use backend::{EVENTS_FILE, GroupBackend, MockBackend, THREADS_FILE};
pub use config::{CgroupConfig, MIN_POLL_INTERVAL};
pub use fs::CgroupFs;

/// Default mount point of the resource hierarchies
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";
