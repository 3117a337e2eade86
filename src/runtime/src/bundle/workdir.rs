//! Working directory lifecycle.
//!
//! A working directory holds the extracted image (`image/`), the root
//! filesystem (`rootfs/`), the runtime configuration (`config.json`) and the
//! detached runtime log (`runtime.log`).
//!
//! Ephemeral directories get a random suffix and are removed on drop unless
//! retained. Reentrant directories are named after the container and are
//! never removed here.

use std::fs;
use std::path::{Path, PathBuf};

use boxrun_core::error::{BoxError, Result};
use tempfile::TempDir;

use super::spec::RUNTIME_CONFIG_FILE;
use crate::oci::{IMAGE_DIR, ROOTFS_DIR};

/// Output of a detached runtime start.
pub const RUNTIME_LOG_FILE: &str = "runtime.log";

/// Prefix of every working directory name.
pub const WORK_DIR_PREFIX: &str = "boxrun-";

#[derive(Debug)]
enum Lifecycle {
    /// Removed when dropped
    Ephemeral(TempDir),
    /// Left on disk
    Retained(PathBuf),
}

/// A container working directory.
#[derive(Debug)]
pub struct WorkDir {
    lifecycle: Lifecycle,
    /// Whether this handle created the directory
    created: bool,
}

impl WorkDir {
    /// Create a fresh, randomly named directory under `root`.
    pub fn ephemeral(root: &Path, name: &str, keep: bool) -> Result<Self> {
        fs::create_dir_all(root).map_err(|e| {
            BoxError::WorkDirError(format!("Failed to create {}: {}", root.display(), e))
        })?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}{}-", WORK_DIR_PREFIX, name))
            .tempdir_in(root)
            .map_err(|e| {
                BoxError::WorkDirError(format!(
                    "Failed to create working directory in {}: {}",
                    root.display(),
                    e
                ))
            })?;

        let lifecycle = if keep {
            Lifecycle::Retained(dir.into_path())
        } else {
            Lifecycle::Ephemeral(dir)
        };

        Ok(Self {
            lifecycle,
            created: true,
        })
    }

    /// Open or create the stable directory of container `name` under `root`.
    pub fn reentrant(root: &Path, name: &str) -> Result<Self> {
        let path = Self::reentrant_path(root, name);
        let created = !path.exists();
        if created {
            fs::create_dir_all(&path).map_err(|e| {
                BoxError::WorkDirError(format!("Failed to create {}: {}", path.display(), e))
            })?;
        }

        tracing::debug!(
            path = %path.display(),
            created,
            "Reentrant working directory"
        );

        Ok(Self {
            lifecycle: Lifecycle::Retained(path),
            created,
        })
    }

    /// Stable directory of a reentrant container.
    pub fn reentrant_path(root: &Path, name: &str) -> PathBuf {
        root.join(format!("{}{}", WORK_DIR_PREFIX, name))
    }

    pub fn path(&self) -> &Path {
        match &self.lifecycle {
            Lifecycle::Ephemeral(dir) => dir.path(),
            Lifecycle::Retained(path) => path,
        }
    }

    pub fn rootfs(&self) -> PathBuf {
        self.path().join(ROOTFS_DIR)
    }

    pub fn image_dir(&self) -> PathBuf {
        self.path().join(IMAGE_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join(RUNTIME_CONFIG_FILE)
    }

    pub fn runtime_log(&self) -> PathBuf {
        self.path().join(RUNTIME_LOG_FILE)
    }

    /// Whether the directory outlives this handle.
    pub fn is_retained(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Retained(_))
    }

    /// Whether this handle created the directory (as opposed to reopening it).
    pub fn was_created(&self) -> bool {
        self.created
    }

    /// Whether a root filesystem has already been assembled here.
    pub fn has_rootfs(&self) -> bool {
        self.rootfs().is_dir()
    }

    /// Remove the directory now, whatever its lifecycle.
    pub fn remove(self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Ephemeral(dir) => dir.close().map_err(|e| {
                BoxError::WorkDirError(format!("Failed to remove working directory: {}", e))
            }),
            Lifecycle::Retained(path) => remove_dir(&path),
        }
    }
}

/// Remove a working directory tree; a missing directory is not an error.
pub fn remove_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BoxError::WorkDirError(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}
