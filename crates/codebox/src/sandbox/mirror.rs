//! Host library mirroring
//!
//! Copies host paths into a sandbox root at the same absolute location
//! (`/usr/lib/python3` lands at `<root>/usr/lib/python3`). Directories become
//! `0755` and files `0444` so the sandbox user can read and execute but never
//! modify them. Symlinks are recreated as symlinks.

use std::fs;
use std::io;
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

pub const DIR_MODE: u32 = 0o755;
pub const FILE_MODE: u32 = 0o444;

/// Summary of one mirroring pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MirrorStats {
    pub files: u64,
    pub dirs: u64,
    pub links: u64,
    pub skipped: u64,
}

/// Location of a host path inside the sandbox root
pub fn destination(root: &Path, host_path: &Path) -> PathBuf {
    root.join(host_path.strip_prefix("/").unwrap_or(host_path))
}

/// Create `dir` and every missing parent below `root`, each with [`DIR_MODE`]
pub fn ensure_dir(root: &Path, dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut current = Some(dir);
    while let Some(path) = current {
        if !path.starts_with(root) {
            break;
        }
        fs::set_permissions(path, fs::Permissions::from_mode(DIR_MODE))?;
        if path == root {
            break;
        }
        current = path.parent();
    }
    Ok(())
}

fn copy_file(src: &Path, dest: &Path) -> io::Result<()> {
    // previous copies are read-only, replace rather than overwrite
    if dest.symlink_metadata().is_ok() {
        fs::remove_file(dest)?;
    }
    fs::copy(src, dest)?;
    fs::set_permissions(dest, fs::Permissions::from_mode(FILE_MODE))
}

fn copy_link(src: &Path, dest: &Path) -> io::Result<()> {
    let target = fs::read_link(src)?;
    if dest.symlink_metadata().is_ok() {
        fs::remove_file(dest)?;
    }
    symlink(target, dest)
}

/// Mirror each host path into `root`.
///
/// Missing host paths are skipped with a warning; any I/O failure while
/// copying aborts the pass.
pub fn mirror_paths(root: &Path, host_paths: &[PathBuf]) -> io::Result<MirrorStats> {
    let mut stats = MirrorStats::default();
    ensure_dir(root, root)?;

    for host_path in host_paths {
        if host_path.symlink_metadata().is_err() {
            warn!(path = %host_path.display(), "library path not found, skipping");
            stats.skipped += 1;
            continue;
        }

        for entry in WalkDir::new(host_path).follow_links(false) {
            let entry = entry.map_err(io::Error::other)?;
            let dest = destination(root, entry.path());
            let file_type = entry.file_type();

            if file_type.is_dir() {
                ensure_dir(root, &dest)?;
                stats.dirs += 1;
                continue;
            }

            if let Some(parent) = dest.parent() {
                ensure_dir(root, parent)?;
            }
            if file_type.is_symlink() {
                copy_link(entry.path(), &dest)?;
                stats.links += 1;
            } else if file_type.is_file() {
                copy_file(entry.path(), &dest)?;
                stats.files += 1;
            } else {
                stats.skipped += 1;
            }
        }

        debug!(path = %host_path.display(), "mirrored library path");
    }

    Ok(stats)
}

/// Copy the contents of `source` into `dest`, which must lie under `root`.
///
/// Unlike [`mirror_paths`] the tree is re-rooted at `dest` rather than kept
/// at its absolute location.
pub fn copy_tree(root: &Path, source: &Path, dest: &Path) -> io::Result<MirrorStats> {
    let mut stats = MirrorStats::default();
    ensure_dir(root, dest)?;

    for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            ensure_dir(root, &target)?;
            stats.dirs += 1;
        } else if file_type.is_symlink() {
            copy_link(entry.path(), &target)?;
            stats.links += 1;
        } else if file_type.is_file() {
            copy_file(entry.path(), &target)?;
            stats.files += 1;
        } else {
            stats.skipped += 1;
        }
    }

    Ok(stats)
}
