//! Image archive assembly.
//!
//! An image archive is extracted into a scratch directory, its manifest is
//! read, and each referenced layer is applied in manifest order onto a
//! single root filesystem directory.

use std::fs;
use std::path::{Path, PathBuf};

use boxrun_core::error::{BoxError, Result};

use super::archive::{self, relative_entry_path, WhiteoutPolicy};
use super::digest::ExpectedDigest;
use super::manifest::{read_manifest, ManifestEntry, MANIFEST_FILE};

/// Scratch directory (under the working directory) holding the extracted archive.
pub const IMAGE_DIR: &str = "image";

/// Root filesystem directory (under the working directory).
pub const ROOTFS_DIR: &str = "rootfs";

/// Result of a completed assembly.
#[derive(Debug, Clone)]
pub struct AssembledImage {
    /// Extracted image archive
    pub scratch_dir: PathBuf,

    /// Root filesystem built from the layers
    pub rootfs: PathBuf,

    /// Manifest entry the layers were read from
    pub manifest: ManifestEntry,
}

/// Builds a root filesystem from an image archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageAssembler {
    whiteouts: WhiteoutPolicy,
}

impl ImageAssembler {
    pub fn new(whiteouts: WhiteoutPolicy) -> Self {
        Self { whiteouts }
    }

    /// Check `archive_path` against `expected`, returning the actual digest.
    pub fn verify(&self, archive_path: &Path, expected: &ExpectedDigest) -> Result<String> {
        expected.verify(archive_path)
    }

    /// Validate, then assemble. Nothing is written under `work_dir` when
    /// validation fails.
    pub fn load(
        &self,
        archive_path: &Path,
        expected: &ExpectedDigest,
        work_dir: &Path,
    ) -> Result<AssembledImage> {
        self.verify(archive_path, expected)?;
        self.assemble(archive_path, work_dir)
    }

    /// Extract `archive_path` and apply its layers into `<work_dir>/rootfs`.
    ///
    /// Every layer the manifest names is checked before the rootfs is
    /// created, so an inconsistent archive fails without a partial tree.
    pub fn assemble(&self, archive_path: &Path, work_dir: &Path) -> Result<AssembledImage> {
        let scratch_dir = work_dir.join(IMAGE_DIR);
        let rootfs = work_dir.join(ROOTFS_DIR);

        fs::create_dir_all(&scratch_dir).map_err(|e| {
            BoxError::WorkDirError(format!(
                "Failed to create {}: {}",
                scratch_dir.display(),
                e
            ))
        })?;

        archive::extract_file(archive_path, &scratch_dir, WhiteoutPolicy::Ignore)?;

        let manifest = read_manifest(&scratch_dir)?;
        if manifest.layers.is_empty() {
            return Err(BoxError::EmptyImage {
                path: scratch_dir.join(MANIFEST_FILE),
            });
        }

        let layer_paths = manifest
            .layers
            .iter()
            .map(|layer| resolve_layer(&scratch_dir, layer))
            .collect::<Result<Vec<_>>>()?;

        fs::create_dir(&rootfs).map_err(|e| {
            BoxError::WorkDirError(format!("Failed to create {}: {}", rootfs.display(), e))
        })?;

        for (index, layer_path) in layer_paths.iter().enumerate() {
            tracing::debug!(
                layer = %manifest.layers[index],
                index,
                "Applying layer"
            );
            archive::extract_file(layer_path, &rootfs, self.whiteouts)?;
        }

        tracing::info!(
            rootfs = %rootfs.display(),
            layers = manifest.layers.len(),
            tags = ?manifest.repo_tags,
            "Assembled root filesystem"
        );

        Ok(AssembledImage {
            scratch_dir,
            rootfs,
            manifest,
        })
    }
}

/// Resolve a manifest layer reference inside the scratch directory.
fn resolve_layer(scratch_dir: &Path, layer: &str) -> Result<PathBuf> {
    let path = scratch_dir.join(relative_entry_path(Path::new(layer))?);
    if !path.is_file() {
        return Err(BoxError::MissingLayer {
            layer: layer.to_string(),
            path,
        });
    }
    Ok(path)
}
