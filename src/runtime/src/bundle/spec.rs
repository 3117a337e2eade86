//! Runtime configuration document synthesis.
//!
//! The document starts from a runc-style `config.json` template and is
//! mutated per invocation. Mutations only ever add to the template: process
//! arguments and the terminal flag are set, a network namespace and a bind
//! mount may be appended, nothing is removed.

use std::fs;
use std::path::{Path, PathBuf};

use boxrun_core::config::{RunConfig, LOCAL_DIR_MOUNT};
use boxrun_core::error::{BoxError, Result};
use serde_json::{json, Map, Value};

/// File name of the runtime configuration inside the working directory.
pub const RUNTIME_CONFIG_FILE: &str = "config.json";

/// Idle loop that keeps a reentrant container alive between execs.
pub const KEEP_ALIVE_SCRIPT: &str = "while true; do sleep 1; done";

const DEFAULT_TEMPLATE: &str = include_str!("config.json");

/// Process the container starts with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessCommand {
    /// `sh -c <command>`
    Shell(String),
    /// The keep-alive idle loop
    KeepAlive,
}

impl ProcessCommand {
    /// Argument vector for the process entry.
    pub fn args(&self) -> Vec<String> {
        let script = match self {
            ProcessCommand::Shell(command) => command.as_str(),
            ProcessCommand::KeepAlive => KEEP_ALIVE_SCRIPT,
        };
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }
}

/// Per-invocation options applied to the template.
#[derive(Debug, Clone)]
pub struct SpecOptions {
    pub process: ProcessCommand,
    pub host_network: bool,
    /// Host directory bound to `/local-dir`
    pub bind_source: Option<PathBuf>,
    pub interactive: bool,
}

impl SpecOptions {
    /// Options for the start step of an invocation.
    ///
    /// Reentrant starts run the keep-alive loop without a terminal; the
    /// caller's command and interactivity belong to the later exec.
    pub fn from_config(config: &RunConfig, command: &str) -> Result<Self> {
        let bind_source = if config.bind_local_dir {
            Some(std::env::current_dir().map_err(|e| {
                BoxError::ConfigTemplate(format!("Failed to resolve current directory: {}", e))
            })?)
        } else {
            None
        };

        let (process, interactive) = if config.is_reentrant() {
            (ProcessCommand::KeepAlive, false)
        } else {
            (ProcessCommand::Shell(command.to_string()), config.interactive)
        };

        Ok(Self {
            process,
            host_network: config.host_network,
            bind_source,
            interactive,
        })
    }
}

/// A runtime configuration document.
#[derive(Debug, Clone)]
pub struct RuntimeSpec {
    document: Value,
}

impl RuntimeSpec {
    /// Parse a template document.
    pub fn from_template(template: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(template)
            .map_err(|e| BoxError::ConfigTemplate(format!("Invalid template: {}", e)))?;
        if !document.is_object() {
            return Err(BoxError::ConfigTemplate(
                "Template must be a JSON object".to_string(),
            ));
        }
        Ok(Self { document })
    }

    /// The embedded template.
    pub fn default_template() -> Result<Self> {
        Self::from_template(DEFAULT_TEMPLATE)
    }

    /// Load a template from `path`, or the embedded one when absent.
    pub fn load_template(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let template = fs::read_to_string(path).map_err(|e| {
                    BoxError::ConfigTemplate(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_template(&template)
            }
            None => Self::default_template(),
        }
    }

    /// Apply per-invocation options.
    pub fn apply(&mut self, options: &SpecOptions) -> Result<()> {
        let process = object_mut(&mut self.document, "process")?;
        process.insert("args".to_string(), json!(options.process.args()));
        if options.interactive {
            process.insert("terminal".to_string(), Value::Bool(true));
        }

        if !options.host_network {
            let linux = object_mut(&mut self.document, "linux")?;
            let namespaces = array_mut(linux, "namespaces")?;
            let declared = namespaces
                .iter()
                .any(|ns| ns.get("type").and_then(Value::as_str) == Some("network"));
            if !declared {
                namespaces.push(json!({ "type": "network" }));
            }
        }

        if let Some(source) = &options.bind_source {
            let root = self.document.as_object_mut().ok_or_else(|| {
                BoxError::ConfigTemplate("Template must be a JSON object".to_string())
            })?;
            let mounts = array_mut(root, "mounts")?;
            mounts.push(json!({
                "destination": LOCAL_DIR_MOUNT,
                "type": "bind",
                "source": source.to_string_lossy(),
                "options": ["rbind", "rprivate", "rw"]
            }));
        }

        Ok(())
    }

    /// Write the document to `<dir>/config.json`, returning its path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(RUNTIME_CONFIG_FILE);
        let json = serde_json::to_vec_pretty(&self.document)?;
        fs::write(&path, json).map_err(|e| {
            BoxError::ConfigTemplate(format!("Failed to write {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), "Wrote runtime configuration");
        Ok(path)
    }

    pub fn document(&self) -> &Value {
        &self.document
    }
}

/// Object member `key` of `document`, created when missing.
fn object_mut<'a>(document: &'a mut Value, key: &str) -> Result<&'a mut Map<String, Value>> {
    let root = document
        .as_object_mut()
        .ok_or_else(|| BoxError::ConfigTemplate("Template must be a JSON object".to_string()))?;
    root.entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| BoxError::ConfigTemplate(format!("'{}' must be an object", key)))
}

/// Array member `key` of `object`, created when missing.
fn array_mut<'a>(object: &'a mut Map<String, Value>, key: &str) -> Result<&'a mut Vec<Value>> {
    object
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| BoxError::ConfigTemplate(format!("'{}' must be an array", key)))
}
