//! External container runtime seam.
//!
//! The lifecycle controller drives the runtime only through
//! [`ContainerRuntime`]; [`RuncCli`] implements it by invoking a runc-compatible
//! binary as a subprocess.

mod cli;

use std::fmt;
use std::path::Path;

use boxrun_core::error::Result;
use serde::{Deserialize, Serialize};

pub use cli::{exit_code, RuncCli, CONTAINER_NOT_FOUND};

/// Operations on the external runtime, keyed by container name.
pub trait ContainerRuntime {
    /// Query a container. `None` when the runtime reports it does not exist.
    fn state(&self, name: &str) -> Result<Option<ContainerState>>;

    /// Create and start a container from `bundle`, blocking until it exits.
    ///
    /// Returns the container process's exit code.
    fn run(&self, name: &str, bundle: &Path, interactive: bool) -> Result<i32>;

    /// Create and start a container from `bundle` without waiting for it.
    ///
    /// Returns once the runtime acknowledges the start.
    fn run_detached(&self, name: &str, bundle: &Path) -> Result<()>;

    /// Run `args` inside a running container, returning its exit code.
    fn exec(&self, name: &str, bundle: &Path, args: &[String], interactive: bool) -> Result<i32>;

    /// Delete a container. `false` when it did not exist.
    fn delete(&self, name: &str, force: bool) -> Result<bool>;
}

/// State document reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub status: ContainerStatus,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub pid: Option<u32>,

    #[serde(default)]
    pub bundle: Option<String>,
}

/// Container status as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Creating,
    Created,
    Running,
    Paused,
    Stopped,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerStatus::Creating => "creating",
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
