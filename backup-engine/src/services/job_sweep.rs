//! Startup reconciliation of interrupted jobs.
//!
//! A process crash mid-job leaves its record stranded in `running`; no code
//! path finalizes it afterwards. On startup, records still `running` past a
//! grace period are marked failed with a synthetic error so the history
//! stays truthful.

use crate::db::connection::DbPool;
use rusqlite::params;

const INTERRUPTED_MESSAGE: &str = "interrupted: process exited while the job was running";

pub fn reconcile_interrupted(pool: &DbPool, grace_secs: i64) -> anyhow::Result<usize> {
    let conn = pool.get()?;
    let now = chrono::Utc::now().to_rfc3339();
    let cutoff = (chrono::Utc::now() - chrono::Duration::seconds(grace_secs)).to_rfc3339();

    let mut total = 0usize;
    for table in ["backup_history", "restore_operations"] {
        let sql = format!(
            "UPDATE {}
             SET status = 'failed', success = 0, error_message = ?1, end_time = ?2,
                 duration_seconds = CAST((julianday(?2) - julianday(start_time)) * 86400 AS INTEGER)
             WHERE status = 'running' AND start_time < ?3",
            table
        );
        total += conn.execute(&sql, params![INTERRUPTED_MESSAGE, now, cutoff])?;
    }

    if total > 0 {
        tracing::warn!(count = total, "Marked interrupted jobs as failed");
    }
    Ok(total)
}
