//! Docker-save style `manifest.json` handling.
//!
//! The file is a JSON array of entries, each naming a config blob, optional
//! repository tags and an ordered list of layer archives (bottom to top),
//! all relative to the image root.

use std::fs;
use std::path::Path;

use boxrun_core::error::{BoxError, Result};
use serde::{Deserialize, Serialize};

/// Manifest file name at the root of an image archive.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One image entry of `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestEntry {
    /// Config blob path
    #[serde(default)]
    pub config: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_tags: Option<Vec<String>>,

    /// Layer archive paths, bottom to top
    #[serde(default)]
    pub layers: Vec<String>,
}

/// Read `manifest.json` from `image_dir`, requiring exactly one entry.
pub fn read_manifest(image_dir: &Path) -> Result<ManifestEntry> {
    let path = image_dir.join(MANIFEST_FILE);
    let content = fs::read_to_string(&path).map_err(|e| {
        BoxError::ArchiveError(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let mut entries: Vec<ManifestEntry> = serde_json::from_str(&content).map_err(|e| {
        BoxError::SerializationError(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    if entries.len() != 1 {
        return Err(BoxError::AmbiguousManifest {
            path,
            count: entries.len(),
        });
    }

    Ok(entries.remove(0))
}

/// Write a single-entry `manifest.json` into `image_dir`.
pub fn write_manifest(image_dir: &Path, entry: &ManifestEntry) -> Result<()> {
    let path = image_dir.join(MANIFEST_FILE);
    let json = serde_json::to_vec(&[entry])?;
    fs::write(&path, json)
        .map_err(|e| BoxError::ArchiveError(format!("Failed to write {}: {}", path.display(), e)))
}
