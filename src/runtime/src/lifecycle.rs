//! Container lifecycle controller.
//!
//! ```text
//! NoSuchContainer ──> Created ──> Running ──┬──> Exited      (blocking run)
//!                                           └──> Persistent  (exec into a
//!                                                             detached container)
//! ```
//!
//! The blocking path always creates the container and waits for it. The
//! reentrant path probes the runtime first: a missing container is prepared
//! and started detached, a running one is reused, anything else is an error.
//! Either way the caller's command is then exec'd and its exit code returned.
//!
//! No locking is done; concurrent invocations against one name must be
//! serialized by the caller.

use std::fmt;
use std::path::{Path, PathBuf};

use boxrun_core::error::{BoxError, Result};

use crate::bundle::ProcessCommand;
use crate::runc::{ContainerRuntime, ContainerStatus};

/// Where a container is in its lifecycle, as seen by this controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NoSuchContainer,
    Created,
    Running,
    /// The container process finished with this code
    Exited(i32),
    /// Still running after an exec, for later invocations
    Persistent,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::NoSuchContainer => write!(f, "no-such-container"),
            Phase::Created => write!(f, "created"),
            Phase::Running => write!(f, "running"),
            Phase::Exited(code) => write!(f, "exited({})", code),
            Phase::Persistent => write!(f, "persistent"),
        }
    }
}

/// What `ensure_running` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAction {
    /// The container was prepared and started detached
    Started,
    /// The container was already running
    AlreadyRunning,
}

/// Drives one named container through the external runtime.
pub struct LifecycleController<'a, R: ContainerRuntime + ?Sized> {
    runtime: &'a R,
    name: &'a str,
    phase: Phase,
}

impl<'a, R: ContainerRuntime + ?Sized> LifecycleController<'a, R> {
    pub fn new(runtime: &'a R, name: &'a str) -> Self {
        Self {
            runtime,
            name,
            phase: Phase::NoSuchContainer,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn transition(&mut self, next: Phase) {
        tracing::debug!(
            container = %self.name,
            from = %self.phase,
            to = %next,
            "Container phase"
        );
        self.phase = next;
    }

    /// Query the runtime for the container's phase.
    ///
    /// Any reported status other than running is a fatal inconsistency.
    pub fn probe(&mut self) -> Result<Phase> {
        match self.runtime.state(self.name)? {
            None => {
                self.phase = Phase::NoSuchContainer;
            }
            Some(state) if state.status == ContainerStatus::Running => {
                self.phase = Phase::Running;
            }
            Some(state) => {
                return Err(BoxError::ContainerState {
                    name: self.name.to_string(),
                    status: state.status.to_string(),
                });
            }
        }
        tracing::debug!(container = %self.name, phase = %self.phase, "Probed container");
        Ok(self.phase)
    }

    /// Make sure the container is running.
    ///
    /// When it does not exist, `prepare` builds its bundle and returns the
    /// bundle directory, and the container is started detached from there.
    /// When it is already running, `prepare` is not called.
    pub fn ensure_running<F>(&mut self, prepare: F) -> Result<StartAction>
    where
        F: FnOnce() -> Result<PathBuf>,
    {
        if self.probe()? == Phase::Running {
            tracing::info!(container = %self.name, "Container already running");
            return Ok(StartAction::AlreadyRunning);
        }

        let bundle = prepare()?;
        self.transition(Phase::Created);
        self.runtime.run_detached(self.name, &bundle)?;
        self.transition(Phase::Running);

        tracing::info!(container = %self.name, "Started detached container");
        Ok(StartAction::Started)
    }

    /// Run the container from `bundle` and wait for it to exit.
    ///
    /// A non-zero exit is an error.
    pub fn run_to_completion(&mut self, bundle: &Path, interactive: bool) -> Result<i32> {
        self.transition(Phase::Created);
        self.transition(Phase::Running);
        let code = self.runtime.run(self.name, bundle, interactive)?;
        self.transition(Phase::Exited(code));

        if code != 0 {
            return Err(BoxError::RuntimeFailed {
                action: "run".to_string(),
                code,
            });
        }
        Ok(code)
    }

    /// Exec `sh -c <command>` in the running container, returning its exit code.
    pub fn exec(&mut self, bundle: &Path, command: &str, interactive: bool) -> Result<i32> {
        if !matches!(self.phase, Phase::Running | Phase::Persistent) {
            return Err(BoxError::ContainerState {
                name: self.name.to_string(),
                status: self.phase.to_string(),
            });
        }

        let args = ProcessCommand::Shell(command.to_string()).args();
        let code = self.runtime.exec(self.name, bundle, &args, interactive)?;
        self.transition(Phase::Persistent);

        tracing::debug!(container = %self.name, exit_code = code, "Exec finished");
        Ok(code)
    }
}
