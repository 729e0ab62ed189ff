//! Per-store file snapshotting.
//!
//! A store is one named data file living at `<stores_dir>/<id>.db`. Backup
//! copies it into a staging directory; restore copies it back, preserving
//! the pre-restore file as a timestamped sibling unless overwrite was
//! requested.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Canonical on-disk location of a store.
pub fn store_file(stores_dir: &Path, store_id: &str) -> PathBuf {
    stores_dir.join(format!("{}.db", store_id))
}

/// Store identifiers become file names; anything that could escape the
/// stores directory is rejected.
fn validate_store_id(store_id: &str) -> io::Result<()> {
    let ok = !store_id.is_empty()
        && store_id != "."
        && store_id != ".."
        && store_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid store identifier: {:?}", store_id),
        ))
    }
}

/// Copy the canonical file for `store_id` into `target_dir`.
///
/// Returns `Ok(None)` when the store has no canonical file: stores that
/// were never provisioned are tolerated, not errors.
pub fn backup_store(
    stores_dir: &Path,
    store_id: &str,
    target_dir: &Path,
) -> io::Result<Option<PathBuf>> {
    validate_store_id(store_id)?;

    let source = store_file(stores_dir, store_id);
    if !source.is_file() {
        tracing::warn!(store = %store_id, "Store has no canonical file, skipping");
        return Ok(None);
    }

    let staged = target_dir.join(format!("{}.db", store_id));
    fs::copy(&source, &staged)?;
    Ok(Some(staged))
}

/// Copy a staged store file from `source_dir` back into its canonical
/// location. Returns `false` when the archive holds nothing for this store.
///
/// With `overwrite` unset, an existing destination is first copied aside to
/// `<file>.<unix-millis>.bak` so the pre-restore data survives.
pub fn restore_store(
    stores_dir: &Path,
    store_id: &str,
    source_dir: &Path,
    overwrite: bool,
) -> io::Result<bool> {
    validate_store_id(store_id)?;

    let staged = source_dir.join(format!("{}.db", store_id));
    if !staged.is_file() {
        tracing::warn!(store = %store_id, "No staged file for store, nothing to restore");
        return Ok(false);
    }

    let dest = store_file(stores_dir, store_id);
    if dest.exists() && !overwrite {
        let aside = safety_snapshot_path(&dest);
        fs::copy(&dest, &aside)?;
        tracing::info!(store = %store_id, snapshot = %aside.display(), "Existing store preserved before restore");
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(&staged, &dest)?;
    Ok(true)
}

fn safety_snapshot_path(dest: &Path) -> PathBuf {
    let millis = chrono::Utc::now().timestamp_millis();
    PathBuf::from(format!("{}.{}.bak", dest.display(), millis))
}
