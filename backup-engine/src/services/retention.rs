//! Archive retention for saved job definitions.

use crate::models::{backup_job::BackupJob, backup_record};
use rusqlite::Connection;
use std::path::Path;

/// Delete completed backups of `job` older than its `retention_days`,
/// removing their archive files first (best effort). Running records are
/// never touched. Returns the number of records removed.
pub fn apply_retention(conn: &Connection, job: &BackupJob) -> anyhow::Result<usize> {
    if job.retention_days <= 0 {
        return Ok(0);
    }

    let cutoff = (chrono::Utc::now() - chrono::Duration::days(job.retention_days)).to_rfc3339();
    let expired = backup_record::find_expired_for_job(conn, &job.id, &cutoff)?;

    for record in &expired {
        if let Some(path) = &record.archive_path {
            let path = Path::new(path);
            if path.is_file() {
                if let Err(e) = std::fs::remove_file(path) {
                    tracing::warn!(archive = %path.display(), error = %e, "Failed to remove expired archive");
                }
            }
        }
        backup_record::delete(conn, &record.id)?;
        tracing::info!(
            backup_id = %record.id,
            job_id = %job.id,
            start_time = %record.start_time,
            "Expired backup removed"
        );
    }

    Ok(expired.len())
}
