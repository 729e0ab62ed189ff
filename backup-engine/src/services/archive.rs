//! Archive packaging.
//!
//! A backup job's staging directory is packaged into a single tar
//! container, zstd-compressed at maximum level when the job asked for
//! compression and stored as a plain tar otherwise. Extraction dispatches
//! on the file extension, so both forms restore through the same path.

use crate::error::EngineError;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use walkdir::WalkDir;
use zstd::stream::{read::Decoder, write::Encoder};

const ZSTD_MAX_LEVEL: i32 = 19;

/// Package everything under `staging_dir` into a single archive in
/// `out_dir`. Relative paths are preserved; the staging root itself is not
/// a path segment inside the archive.
pub fn build(
    staging_dir: &Path,
    name_hint: &str,
    compress: bool,
    out_dir: &Path,
) -> Result<PathBuf, EngineError> {
    // sortable and millisecond-precise so rapid jobs with the same hint
    // cannot collide
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
    let extension = if compress { "tar.zst" } else { "tar" };
    let archive_path = out_dir.join(format!("{}_{}.{}", sanitize(name_hint), timestamp, extension));

    let file = File::create(&archive_path)
        .map_err(|e| EngineError::archive("failed to create", &archive_path, e))?;

    let result = if compress {
        Encoder::new(file, ZSTD_MAX_LEVEL)
            .and_then(|encoder| write_tar(encoder, staging_dir))
            .and_then(|encoder| encoder.finish().map(|_| ()))
    } else {
        write_tar(file, staging_dir).map(|_| ())
    };

    match result {
        Ok(()) => {
            tracing::info!(archive = %archive_path.display(), "Archive created");
            Ok(archive_path)
        }
        Err(e) => {
            // don't leave a truncated container behind
            let _ = std::fs::remove_file(&archive_path);
            Err(EngineError::archive("failed to build", &archive_path, e))
        }
    }
}

fn write_tar<W: Write>(writer: W, staging_dir: &Path) -> std::io::Result<W> {
    let mut builder = Builder::new(writer);
    for entry in WalkDir::new(staging_dir).follow_links(false) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry.path().strip_prefix(staging_dir).unwrap_or(entry.path());
        if relative.as_os_str().is_empty() {
            continue;
        }
        if entry.file_type().is_dir() {
            builder.append_dir(relative, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), relative)?;
        }
    }
    builder.into_inner()
}

/// Inflate an archive's full contents into `dest_dir`.
pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<(), EngineError> {
    let file = File::open(archive_path)
        .map_err(|e| EngineError::archive("cannot open", archive_path, e))?;
    std::fs::create_dir_all(dest_dir)?;

    let result = if is_zstd(archive_path) {
        Decoder::new(file)
            .and_then(|decoder| Archive::new(decoder).unpack(dest_dir))
    } else {
        Archive::new(file).unpack(dest_dir)
    };

    result.map_err(|e| EngineError::archive("failed to extract", archive_path, e))
}

fn is_zstd(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zst")
}

/// Archive names derive from a caller-supplied label; anything outside a
/// conservative file-name alphabet is squashed.
fn sanitize(name_hint: &str) -> String {
    let cleaned: String = name_hint
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.trim_matches('-').is_empty() {
        "backup".into()
    } else {
        cleaned
    }
}
