//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "corral")]
#[command(about = "Per-resource container handler driver", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Mount point of the resource hierarchies
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// JSON backend configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Prepare every resource hierarchy on this machine
    Init {
        /// JSON init spec (default: built-in controllers)
        #[arg(long)]
        spec: Option<PathBuf>,
    },

    /// Create a container
    Create {
        /// Absolute container name, e.g. /batch/job1
        name: String,

        /// JSON container spec
        #[arg(long)]
        spec: Option<PathBuf>,
    },

    /// Update a container
    Update {
        /// Container name
        name: String,

        /// JSON container spec
        #[arg(long)]
        spec: PathBuf,

        /// Reset everything the spec does not mention
        #[arg(long)]
        replace: bool,
    },

    /// Print the live spec of a container
    Spec {
        /// Container name
        name: String,
    },

    /// Print container statistics
    Stats {
        /// Container name
        name: String,

        /// Include detailed breakdowns
        #[arg(long)]
        full: bool,
    },

    /// Move threads into a container
    Enter {
        /// Container name
        name: String,

        /// Thread ids
        #[arg(required = true)]
        tids: Vec<String>,
    },

    /// Destroy a container
    Destroy {
        /// Container name
        name: String,
    },

    /// Print container events as they happen
    Watch {
        /// Container name
        name: String,

        /// Resource serving the event
        #[arg(long)]
        resource: String,

        /// JSON event spec
        #[arg(long)]
        event: PathBuf,

        /// Exit after this many events
        #[arg(long)]
        count: Option<usize>,
    },
}
