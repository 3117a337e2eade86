//! RuncCli - drives a runc-compatible binary as a subprocess.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};

use boxrun_core::config::RuntimeConfig;
use boxrun_core::error::{BoxError, Result};

use super::{ContainerRuntime, ContainerState};
use crate::bundle::RUNTIME_LOG_FILE;

/// Diagnostic the runtime prints for an unknown container name.
pub const CONTAINER_NOT_FOUND: &str = "container does not exist";

/// Subprocess implementation of [`ContainerRuntime`].
#[derive(Debug, Clone)]
pub struct RuncCli {
    binary: PathBuf,
    global_args: Vec<String>,
}

impl RuncCli {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            global_args: config.global_args.clone(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Command with the global arguments and `subcommand` already applied.
    fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.global_args).arg(subcommand);
        cmd
    }

    fn spawn_error(&self, action: &str, e: std::io::Error) -> BoxError {
        BoxError::RuntimeError {
            action: action.to_string(),
            message: format!("Failed to execute {}: {}", self.binary.display(), e),
        }
    }

    fn output(&self, action: &str, mut cmd: Command) -> Result<Output> {
        tracing::trace!(command = ?cmd, "Invoking runtime");
        cmd.stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(action, e))
    }

    fn status(&self, action: &str, mut cmd: Command) -> Result<ExitStatus> {
        tracing::trace!(command = ?cmd, "Invoking runtime");
        cmd.status().map_err(|e| self.spawn_error(action, e))
    }
}

impl ContainerRuntime for RuncCli {
    fn state(&self, name: &str) -> Result<Option<ContainerState>> {
        let mut cmd = self.command("state");
        cmd.arg(name);
        let output = self.output("state", cmd)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains(CONTAINER_NOT_FOUND) {
                return Ok(None);
            }
            return Err(BoxError::RuntimeError {
                action: "state".to_string(),
                message: diagnostic(&stderr, output.status),
            });
        }

        let state: ContainerState = serde_json::from_slice(&output.stdout).map_err(|e| {
            BoxError::RuntimeError {
                action: "state".to_string(),
                message: format!("Unparseable state document: {}", e),
            }
        })?;
        Ok(Some(state))
    }

    fn run(&self, name: &str, bundle: &Path, interactive: bool) -> Result<i32> {
        let mut cmd = self.command("run");
        cmd.arg(name)
            .current_dir(bundle)
            .stdin(foreground_stdin(interactive))
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let status = self.status("run", cmd)?;
        Ok(exit_code(status))
    }

    fn run_detached(&self, name: &str, bundle: &Path) -> Result<()> {
        // A file, not a pipe: the detached runtime keeps these descriptors
        // open after this call returns.
        let log_path = bundle.join(RUNTIME_LOG_FILE);
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| BoxError::RuntimeError {
                action: "run --detach".to_string(),
                message: format!("Failed to open {}: {}", log_path.display(), e),
            })?;
        let log_err = log.try_clone()?;

        let mut cmd = self.command("run");
        cmd.arg("--detach")
            .arg(name)
            .current_dir(bundle)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        let status = self.status("run --detach", cmd)?;
        if !status.success() {
            return Err(BoxError::RuntimeError {
                action: "run --detach".to_string(),
                message: diagnostic(&read_log(&log_path), status),
            });
        }

        tracing::debug!(
            container = %name,
            log = %log_path.display(),
            "Runtime acknowledged detached start"
        );
        Ok(())
    }

    fn exec(&self, name: &str, bundle: &Path, args: &[String], interactive: bool) -> Result<i32> {
        let mut cmd = self.command("exec");
        if interactive {
            cmd.arg("--tty");
        }
        cmd.arg(name)
            .args(args)
            .current_dir(bundle)
            .stdin(foreground_stdin(interactive))
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let status = self.status("exec", cmd)?;
        Ok(exit_code(status))
    }

    fn delete(&self, name: &str, force: bool) -> Result<bool> {
        let mut cmd = self.command("delete");
        if force {
            cmd.arg("--force");
        }
        cmd.arg(name);
        let output = self.output("delete", cmd)?;

        if output.status.success() {
            return Ok(true);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains(CONTAINER_NOT_FOUND) {
            return Ok(false);
        }
        Err(BoxError::RuntimeError {
            action: "delete".to_string(),
            message: diagnostic(&stderr, output.status),
        })
    }
}

/// Exit code of a finished process; a signal death maps to 128 + signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}

fn foreground_stdin(interactive: bool) -> Stdio {
    if interactive {
        Stdio::inherit()
    } else {
        Stdio::null()
    }
}

fn diagnostic(text: &str, status: ExitStatus) -> String {
    let text = text.trim();
    if text.is_empty() {
        format!("exited with code {}", exit_code(status))
    } else {
        text.to_string()
    }
}

fn read_log(path: &Path) -> String {
    let mut content = String::new();
    if let Ok(mut file) = File::open(path) {
        let _ = file.read_to_string(&mut content);
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_from_wait_status() {
        // Raw wait statuses: exit code in the high byte, signal in the low bits.
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(exit_code(ExitStatus::from_raw(15)), 143);
    }

    #[test]
    fn test_diagnostic_prefers_runtime_text() {
        let status = ExitStatus::from_raw(1 << 8);
        assert_eq!(diagnostic("  boom\n", status), "boom");
        assert_eq!(diagnostic("", status), "exited with code 1");
    }

    #[test]
    fn test_missing_binary_is_runtime_error() {
        let runtime = RuncCli::new(&RuntimeConfig {
            binary: PathBuf::from("/nonexistent/boxrun-test-runtime"),
            global_args: Vec::new(),
        });

        let err = runtime.state("ci").unwrap_err();

        match err {
            BoxError::RuntimeError { action, message } => {
                assert_eq!(action, "state");
                assert!(message.contains("/nonexistent/boxrun-test-runtime"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
