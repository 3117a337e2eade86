//! tar+gzip archive codec.
//!
//! Extraction is a single forward pass over the entry stream. Hard links are
//! recorded while streaming and created only after the stream is exhausted,
//! since a link may precede its target. Symlinks are created immediately.
//!
//! Every path is checked against the extraction root after resolving the
//! links already on disk, so a symlink laid down by an earlier entry or
//! layer cannot redirect a later write outside the root.
//!
//! Creation walks a directory tree in sorted order using `lstat` metadata,
//! so symlinks are archived as links and never followed.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Component, Path, PathBuf};

use boxrun_core::error::{BoxError, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder, EntryType, Header};

/// Prefix of an OCI whiteout marker.
const WHITEOUT_PREFIX: &str = ".wh.";

/// Marker that hides every lower-layer entry of its directory.
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// Mode for parent directories the archive does not declare.
const IMPLICIT_DIR_MODE: u32 = 0o755;

/// How `.wh.` marker entries are treated while extracting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhiteoutPolicy {
    /// Extract markers as ordinary files.
    #[default]
    Ignore,
    /// Delete the marked paths from the tree.
    Apply,
}

/// Counts reported by a completed extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub directories: usize,
    pub files: usize,
    pub symlinks: usize,
    pub hard_links: usize,
    pub whiteouts: usize,
}

/// Extract a gzip-compressed tar stream into `dst`.
pub fn extract<R: Read>(gzip_stream: R, dst: &Path) -> Result<ExtractStats> {
    extract_with(gzip_stream, dst, WhiteoutPolicy::Ignore)
}

/// Extract a tar.gz file into `dst`.
pub fn extract_file(archive_path: &Path, dst: &Path, whiteouts: WhiteoutPolicy) -> Result<ExtractStats> {
    let file = File::open(archive_path).map_err(|e| {
        BoxError::ArchiveError(format!(
            "Failed to open archive {}: {}",
            archive_path.display(),
            e
        ))
    })?;

    let stats = extract_with(BufReader::new(file), dst, whiteouts)?;

    tracing::debug!(
        archive = %archive_path.display(),
        target = %dst.display(),
        files = stats.files,
        directories = stats.directories,
        symlinks = stats.symlinks,
        hard_links = stats.hard_links,
        "Extracted archive"
    );

    Ok(stats)
}

/// Extract a gzip-compressed tar stream into `dst` with an explicit whiteout policy.
pub fn extract_with<R: Read>(
    gzip_stream: R,
    dst: &Path,
    whiteouts: WhiteoutPolicy,
) -> Result<ExtractStats> {
    let root = canonical_root(dst)?;
    let mut archive = Archive::new(MultiGzDecoder::new(gzip_stream));
    let mut stats = ExtractStats::default();
    let mut hard_links: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut written: HashSet<PathBuf> = HashSet::new();

    let entries = archive
        .entries()
        .map_err(|e| BoxError::ArchiveError(format!("Failed to read tar stream: {}", e)))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| BoxError::ArchiveError(format!("Failed to read tar entry: {}", e)))?;

        let raw_path = entry
            .path()
            .map_err(|e| BoxError::ArchiveError(format!("Invalid entry path: {}", e)))?
            .into_owned();
        let relative = relative_entry_path(&raw_path)?;
        let entry_type = entry.header().entry_type();

        if relative.as_os_str().is_empty() {
            // The archive root itself, usually "./".
            if entry_type.is_dir() {
                continue;
            }
            return Err(BoxError::UnsafeEntryPath(raw_path.display().to_string()));
        }

        if is_whiteout(&relative) {
            if whiteouts == WhiteoutPolicy::Apply {
                apply_whiteout(&root, &relative, &written)?;
                stats.whiteouts += 1;
                continue;
            }
            tracing::debug!(path = %relative.display(), "Extracting whiteout marker as a plain file");
        }

        let target = root.join(&relative);
        let mode = entry.header().mode().unwrap_or(0o644) & 0o7777;

        match entry_type {
            EntryType::Directory => {
                ensure_parent(&root, &target)?;
                match fs::DirBuilder::new().mode(mode).create(&target) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                    Err(e) => {
                        return Err(io_error("create directory", &target, e));
                    }
                }
                stats.directories += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                ensure_parent(&root, &target)?;
                // Unlink first so neither a symlink nor another hard link
                // to the old inode sees the new content.
                remove_non_dir(&target)?;
                let mut file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(mode)
                    .open(&target)
                    .map_err(|e| io_error("create file", &target, e))?;
                io::copy(&mut entry, &mut file)
                    .map_err(|e| io_error("write file", &target, e))?;
                stats.files += 1;
            }
            EntryType::Link => {
                let link_name = entry_link_name(&entry, &raw_path)?;
                let source = root.join(relative_entry_path(&link_name)?);
                hard_links.push((target, source));
            }
            EntryType::Symlink => {
                let link_name = entry_link_name(&entry, &raw_path)?;
                ensure_parent(&root, &target)?;
                remove_non_dir(&target)?;
                std::os::unix::fs::symlink(&link_name, &target)
                    .map_err(|e| io_error("create symlink", &target, e))?;
                stats.symlinks += 1;
            }
            EntryType::XGlobalHeader => continue,
            other => {
                return Err(BoxError::UnsupportedEntry {
                    entry_type: format!("{:?}", other),
                    path: raw_path.display().to_string(),
                });
            }
        }

        if whiteouts == WhiteoutPolicy::Apply {
            written.insert(relative);
        }
    }

    for (link, source) in hard_links {
        ensure_parent(&root, &link)?;
        if let Some(parent) = source.parent() {
            if fs::symlink_metadata(parent).is_ok() {
                check_inside(&root, parent, &source)?;
            }
        }
        remove_non_dir(&link)?;
        fs::hard_link(&source, &link).map_err(|e| BoxError::UnresolvedHardLink {
            link: link.clone(),
            target: source.clone(),
            reason: e.to_string(),
        })?;
        stats.hard_links += 1;
    }

    Ok(stats)
}

/// Write a gzip-compressed tar of `src_dir` to `writer` at the default level.
///
/// Returns the writer once the gzip trailer has been written.
pub fn create<W: Write>(src_dir: &Path, writer: W) -> Result<W> {
    create_with_level(src_dir, writer, Compression::default())
}

/// Write a gzip-compressed tar of `src_dir` to `writer` at `level`.
pub fn create_with_level<W: Write>(src_dir: &Path, writer: W, level: Compression) -> Result<W> {
    let mut builder = Builder::new(GzEncoder::new(writer, level));
    builder.follow_symlinks(false);

    append_tree(&mut builder, src_dir, src_dir)?;

    let encoder = builder
        .into_inner()
        .map_err(|e| BoxError::ArchiveError(format!("Failed to finalize tar stream: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| BoxError::ArchiveError(format!("Failed to finalize gzip stream: {}", e)))
}

/// Write a gzip-compressed tar of `src_dir` to a new file at `output_path`.
pub fn create_file(src_dir: &Path, output_path: &Path) -> Result<()> {
    let file = File::create(output_path).map_err(|e| io_error("create archive", output_path, e))?;
    let mut file = create(src_dir, io::BufWriter::new(file))?;
    file.flush()
        .map_err(|e| io_error("write archive", output_path, e))?;

    tracing::debug!(
        source = %src_dir.display(),
        archive = %output_path.display(),
        "Created archive"
    );

    Ok(())
}

/// Recursively append the children of `current` in file-name order.
fn append_tree<W: Write>(builder: &mut Builder<W>, root: &Path, current: &Path) -> Result<()> {
    let read_dir = fs::read_dir(current).map_err(|e| io_error("read directory", current, e))?;
    let mut children = read_dir
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| io_error("read directory", current, e))?;
    children.sort_by_key(|entry| entry.file_name());

    for child in children {
        let path = child.path();
        let relative = path.strip_prefix(root).map_err(|e| {
            BoxError::ArchiveError(format!(
                "Failed to compute relative path for {}: {}",
                path.display(),
                e
            ))
        })?;

        let metadata = fs::symlink_metadata(&path).map_err(|e| io_error("stat", &path, e))?;
        let file_type = metadata.file_type();

        let mut header = Header::new_gnu();
        header.set_metadata(&metadata);
        // Access and change times vary between reads of the same tree.
        if let Some(gnu) = header.as_gnu_mut() {
            gnu.set_atime(0);
            gnu.set_ctime(0);
        }

        if file_type.is_symlink() {
            let target = fs::read_link(&path).map_err(|e| io_error("read symlink", &path, e))?;
            header.set_size(0);
            builder
                .append_link(&mut header, relative, &target)
                .map_err(|e| io_error("archive symlink", &path, e))?;
        } else if file_type.is_file() {
            let file = File::open(&path).map_err(|e| io_error("open", &path, e))?;
            builder
                .append_data(&mut header, relative, BufReader::new(file))
                .map_err(|e| io_error("archive file", &path, e))?;
        } else {
            header.set_size(0);
            builder
                .append_data(&mut header, relative, io::empty())
                .map_err(|e| io_error("archive entry", &path, e))?;
            if file_type.is_dir() {
                append_tree(builder, root, &path)?;
            }
        }
    }

    Ok(())
}

/// Normalise an archive path to a relative path inside the extraction root.
///
/// Leading `/` and `.` components are dropped; `..` is rejected.
pub(crate) fn relative_entry_path(path: &Path) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(BoxError::UnsafeEntryPath(path.display().to_string()));
            }
        }
    }
    Ok(clean)
}

fn entry_link_name<R: Read>(entry: &tar::Entry<'_, R>, raw_path: &Path) -> Result<PathBuf> {
    entry
        .link_name()
        .map_err(|e| {
            BoxError::ArchiveError(format!(
                "Invalid link name for {}: {}",
                raw_path.display(),
                e
            ))
        })?
        .map(|name| name.into_owned())
        .ok_or_else(|| {
            BoxError::ArchiveError(format!("Link entry {} has no target", raw_path.display()))
        })
}

fn is_whiteout(relative: &Path) -> bool {
    relative
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with(WHITEOUT_PREFIX))
        .unwrap_or(false)
}

/// Remove what a whiteout marker hides.
///
/// Entries written earlier in the same stream belong to the same layer and
/// survive an opaque marker.
fn apply_whiteout(root: &Path, relative: &Path, written: &HashSet<PathBuf>) -> Result<()> {
    let parent = relative.parent().unwrap_or_else(|| Path::new(""));
    let name = relative
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();

    let dir = root.join(parent);
    if fs::symlink_metadata(&dir).is_err() {
        return Ok(());
    }
    let dir = check_inside(root, &dir, relative)?;

    if name == OPAQUE_WHITEOUT {
        let children = match fs::read_dir(&dir) {
            Ok(children) => children,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error("read directory", &dir, e)),
        };
        for child in children {
            let child = child.map_err(|e| io_error("read directory", &dir, e))?;
            if written.contains(&parent.join(child.file_name())) {
                continue;
            }
            remove_existing(&child.path())?;
        }
        tracing::trace!(dir = %dir.display(), "Applied opaque whiteout");
    } else if let Some(hidden) = name.strip_prefix(WHITEOUT_PREFIX) {
        let target = dir.join(hidden);
        remove_existing(&target)?;
        tracing::trace!(path = %target.display(), "Applied whiteout");
    }

    Ok(())
}

/// Create the extraction root if needed and return its canonical path.
fn canonical_root(dst: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dst).map_err(|e| io_error("create directory", dst, e))?;
    fs::canonicalize(dst).map_err(|e| io_error("resolve", dst, e))
}

/// Resolve `path` through the links on disk and require it to stay under `root`.
///
/// `entry` names the archive path in the error.
fn check_inside(root: &Path, path: &Path, entry: &Path) -> Result<PathBuf> {
    let resolved = fs::canonicalize(path).map_err(|e| io_error("resolve", path, e))?;
    if !resolved.starts_with(root) {
        return Err(BoxError::UnsafeEntryPath(format!(
            "{} resolves outside the extraction root to {}",
            entry.display(),
            resolved.display()
        )));
    }
    Ok(resolved)
}

/// Check the deepest existing ancestor of `path` stays under `root`, then
/// create the missing parent directories below it.
fn ensure_parent(root: &Path, path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };

    let mut existing = parent;
    while fs::symlink_metadata(existing).is_err() {
        match existing.parent() {
            Some(up) => existing = up,
            None => break,
        }
    }
    check_inside(root, existing, path)?;

    if existing != parent {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(IMPLICIT_DIR_MODE)
            .create(parent)
            .map_err(|e| io_error("create directory", parent, e))?;
    }
    Ok(())
}

fn remove_non_dir(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => {
            fs::remove_file(path).map_err(|e| io_error("replace", path, e))
        }
        _ => Ok(()),
    }
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(path).map_err(|e| io_error("remove directory", path, e))
        }
        Ok(_) => fs::remove_file(path).map_err(|e| io_error("remove", path, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error("stat", path, e)),
    }
}

fn io_error(action: &str, path: &Path, e: io::Error) -> BoxError {
    BoxError::ArchiveError(format!("Failed to {} {}: {}", action, path.display(), e))
}
