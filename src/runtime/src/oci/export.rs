//! Output image packaging.
//!
//! Repackages a root filesystem as a single-layer image archive:
//!
//! ```text
//! <output>.tar.gz
//! ├── manifest.json          [{Config, RepoTags?, Layers: [<digest>.tar.gz]}]
//! ├── <config digest>.json   image configuration
//! └── <digest>.tar.gz        the root filesystem
//! ```
//!
//! Layer and config names are the SHA-256 of their own content (the layer's
//! digest is taken over its decompressed tar stream).

use std::fs;
use std::path::{Path, PathBuf};

use boxrun_core::config::OutputConfig;
use boxrun_core::error::{BoxError, Result};
use oci_spec::image::ImageConfiguration;

use super::archive;
use super::digest::{digest_of_decompressed_tar, sha256_bytes};
use super::manifest::{write_manifest, ManifestEntry};

/// PATH entry recorded in the image configuration.
pub const DEFAULT_PATH_ENV: &str =
    "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// A packaged output image.
#[derive(Debug, Clone)]
pub struct ExportedImage {
    /// Image archive written
    pub path: PathBuf,

    /// Digest of the layer's decompressed tar
    pub layer_digest: String,

    /// Digest of the serialized image configuration
    pub config_digest: String,
}

/// Package `rootfs` into the image archive described by `output`.
///
/// A partially written output file is removed on failure. A file already at
/// the output path is left alone when the run fails before writing it.
pub fn export_image(rootfs: &Path, output: &OutputConfig) -> Result<ExportedImage> {
    let staging = tempfile::Builder::new()
        .prefix("boxrun-export-")
        .tempdir()
        .map_err(|e| BoxError::WorkDirError(format!("Failed to create staging directory: {}", e)))?;

    let exported = stage(rootfs, staging.path(), output)?;

    if let Err(e) = archive::create_file(staging.path(), &output.path) {
        if let Err(cleanup) = fs::remove_file(&output.path) {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    output = %output.path.display(),
                    error = %cleanup,
                    "Failed to remove partial output image"
                );
            }
        }
        return Err(e);
    }

    tracing::info!(
        output = %output.path.display(),
        layer = %exported.layer_digest,
        config = %exported.config_digest,
        "Wrote output image"
    );

    Ok(exported)
}

/// Lay out the layer, config and manifest of the output image in `staging`.
fn stage(rootfs: &Path, staging: &Path, output: &OutputConfig) -> Result<ExportedImage> {
    // 1. Layer, renamed after its content digest
    let unnamed_layer = staging.join("rootfs.tar.gz");
    archive::create_file(rootfs, &unnamed_layer)?;
    let layer_digest = digest_of_decompressed_tar(&unnamed_layer)?;
    let layer_name = format!("{}.tar.gz", layer_digest);
    fs::rename(&unnamed_layer, staging.join(&layer_name))?;

    // 2. Image configuration
    let config_bytes = image_config_bytes(&layer_digest)?;
    let config_digest = sha256_bytes(&config_bytes);
    let config_name = format!("{}.json", config_digest);
    fs::write(staging.join(&config_name), &config_bytes)?;

    // 3. Manifest
    let entry = ManifestEntry {
        config: config_name,
        repo_tags: if output.repo_tags.is_empty() {
            None
        } else {
            Some(output.repo_tags.clone())
        },
        layers: vec![layer_name],
    };
    write_manifest(staging, &entry)?;

    Ok(ExportedImage {
        path: output.path.clone(),
        layer_digest,
        config_digest,
    })
}

/// Serialized image configuration for a single layer.
fn image_config_bytes(layer_digest: &str) -> Result<Vec<u8>> {
    let document = serde_json::json!({
        "architecture": image_architecture(),
        "os": "linux",
        "config": {
            "Env": [DEFAULT_PATH_ENV]
        },
        "rootfs": {
            "type": "layers",
            "diff_ids": [format!("sha256:{layer_digest}")]
        }
    });

    let config: ImageConfiguration = serde_json::from_value(document)
        .map_err(|e| BoxError::SerializationError(format!("Invalid image configuration: {}", e)))?;

    Ok(serde_json::to_vec(&config)?)
}

/// Image architecture name for the host.
fn image_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64le",
        other => other,
    }
}
