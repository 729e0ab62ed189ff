//! Recursive directory mirroring.
//!
//! Used to stage file trees during backup and to re-materialize them on
//! restore. Fails on the first unreadable or unwritable entry; partially
//! copied entries are left in place for the caller's cleanup scope.

use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Copy every file and subdirectory of `source` into `destination`,
/// preserving relative structure. `destination` is created if absent.
pub fn copy_tree(source: &Path, destination: &Path) -> std::io::Result<()> {
    fs::create_dir_all(destination)?;

    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        if relative.as_os_str().is_empty() {
            continue; // the source root itself
        }

        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// Total size in bytes of all regular files under `root`.
pub fn tree_size(root: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(std::io::Error::from)?.len();
        }
    }
    Ok(total)
}
