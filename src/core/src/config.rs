use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Literal accepted in place of an expected digest to disable validation.
pub const SKIP_DIGEST_SENTINEL: &str = "skip-sha256-validation";

/// Default external runtime binary.
pub const DEFAULT_RUNTIME_BINARY: &str = "runc";

/// In-container destination of the `bind_local_dir` mount.
pub const LOCAL_DIR_MOUNT: &str = "/local-dir";

/// Length of generated container names.
pub const GENERATED_NAME_LEN: usize = 12;

/// Invocation configuration.
///
/// Built once from the command line and passed by reference into every
/// component; nothing reads process-wide flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Container name (generated when absent, mandatory when reentrant)
    pub name: Option<String>,

    /// Working directory lifecycle
    pub mode: WorkDirMode,

    /// Share the host network namespace instead of isolating it
    pub host_network: bool,

    /// Bind the invoking process's cwd to /local-dir
    pub bind_local_dir: bool,

    /// Allocate a terminal and connect stdin for the foreground step
    pub interactive: bool,

    /// Honour `.wh.` whiteout markers while applying layers
    pub apply_whiteouts: bool,

    /// Base directory for working directories
    pub work_root: PathBuf,

    /// Runtime config template (embedded template when absent)
    pub config_template: Option<PathBuf>,

    /// External runtime invocation
    pub runtime: RuntimeConfig,

    /// Output image, when requested
    pub output: Option<OutputConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: None,
            mode: WorkDirMode::default(),
            host_network: false,
            bind_local_dir: false,
            interactive: false,
            apply_whiteouts: false,
            work_root: std::env::temp_dir(),
            config_template: None,
            runtime: RuntimeConfig::default(),
            output: None,
        }
    }
}

impl RunConfig {
    /// Whether the working directory and container persist across invocations.
    pub fn is_reentrant(&self) -> bool {
        matches!(self.mode, WorkDirMode::Reentrant)
    }
}

/// Working directory lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkDirMode {
    /// Randomly named, removed on exit unless `keep` is set
    Ephemeral { keep: bool },
    /// Named after the container, never removed automatically
    Reentrant,
}

impl Default for WorkDirMode {
    fn default() -> Self {
        Self::Ephemeral { keep: false }
    }
}

/// External runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Runtime binary (resolved through PATH when not absolute)
    pub binary: PathBuf,

    /// Arguments placed before the subcommand (e.g. `--root <dir>`)
    pub global_args: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_RUNTIME_BINARY),
            global_args: Vec::new(),
        }
    }
}

/// Output image configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Destination of the image archive
    pub path: PathBuf,

    /// RepoTags recorded in the manifest
    pub repo_tags: Vec<String>,
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Map a repeated `-v` count to a level; zero keeps warnings only.
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => LogLevel::Warn,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Directive string understood by `EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_defaults() {
        let config = RunConfig::default();
        assert!(config.name.is_none());
        assert!(!config.host_network);
        assert!(!config.bind_local_dir);
        assert!(!config.interactive);
        assert!(!config.is_reentrant());
        assert_eq!(config.mode, WorkDirMode::Ephemeral { keep: false });
        assert_eq!(config.runtime.binary, PathBuf::from("runc"));
        assert!(config.output.is_none());
    }

    #[test]
    fn test_reentrant_mode() {
        let config = RunConfig {
            mode: WorkDirMode::Reentrant,
            ..Default::default()
        };
        assert!(config.is_reentrant());
    }

    #[test]
    fn test_log_level_from_verbosity() {
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Warn);
        assert_eq!(LogLevel::from_verbosity(1), LogLevel::Info);
        assert_eq!(LogLevel::from_verbosity(2), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(7), LogLevel::Trace);
        assert_eq!(LogLevel::from_verbosity(2).as_filter(), "debug");
    }

    #[test]
    fn test_log_level_into_tracing() {
        let level: tracing::Level = LogLevel::Info.into();
        assert_eq!(level, tracing::Level::INFO);
    }

    #[test]
    fn test_run_config_serializes() {
        let config = RunConfig {
            name: Some("ci".to_string()),
            mode: WorkDirMode::Reentrant,
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["name"], "ci");
        assert_eq!(json["mode"], "reentrant");
        assert_eq!(json["runtime"]["binary"], "runc");
    }
}
