use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot kind. Only full snapshots exist today; the enum is kept so the
/// wire format does not change when incremental support lands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    #[default]
    Full,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
        }
    }
}

/// Caller-supplied configuration for one backup job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupJobConfig {
    pub name: String,
    #[serde(default)]
    pub backup_type: BackupType,
    #[serde(default)]
    pub stores: Vec<String>,
    #[serde(default)]
    pub include_files: bool,
    #[serde(default = "default_compression")]
    pub compression_enabled: bool,
    #[serde(default)]
    pub encryption_enabled: bool,
}

fn default_compression() -> bool {
    true
}

// ── BackupRecord ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub job_id: Option<String>,
    pub name: String,
    pub backup_type: String,
    pub stores: String, // JSON array stored as text
    pub include_files: i64,
    pub compression_enabled: i64,
    pub encryption_enabled: i64,
    pub retention_days: Option<i64>,
    pub archive_path: Option<String>,
    pub file_name: Option<String>,
    pub size_bytes: Option<i64>,
    pub compression_ratio: Option<f64>,
    pub stores_included: Option<String>, // JSON array stored as text
    pub files_included: i64,
    pub skipped_items: String, // JSON array stored as text
    pub start_time: String,
    pub end_time: Option<String>,
    pub duration_seconds: Option<i64>,
    pub status: String,
    pub success: i64,
    pub checksum: Option<String>,
    pub created_by: String,
    pub error_message: Option<String>,
}

/// Outcome fields written when a backup finishes successfully.
#[derive(Debug, Clone)]
pub struct BackupSuccess {
    pub archive_path: String,
    pub file_name: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub compression_ratio: Option<f64>,
    pub stores_included: Vec<String>,
    pub files_included: bool,
    pub skipped_items: Vec<String>,
}

fn row_to_record(row: &Row) -> rusqlite::Result<BackupRecord> {
    Ok(BackupRecord {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        name: row.get("name")?,
        backup_type: row.get("backup_type")?,
        stores: row.get("stores")?,
        include_files: row.get("include_files")?,
        compression_enabled: row.get("compression_enabled")?,
        encryption_enabled: row.get("encryption_enabled")?,
        retention_days: row.get("retention_days")?,
        archive_path: row.get("archive_path")?,
        file_name: row.get("file_name")?,
        size_bytes: row.get("size_bytes")?,
        compression_ratio: row.get("compression_ratio")?,
        stores_included: row.get("stores_included")?,
        files_included: row.get("files_included")?,
        skipped_items: row.get("skipped_items")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        duration_seconds: row.get("duration_seconds")?,
        status: row.get("status")?,
        success: row.get("success")?,
        checksum: row.get("checksum")?,
        created_by: row.get("created_by")?,
        error_message: row.get("error_message")?,
    })
}

/// Insert a `running` record for a freshly started backup job.
pub fn start(
    conn: &Connection,
    config: &BackupJobConfig,
    job_id: Option<&str>,
    actor: &str,
) -> anyhow::Result<BackupRecord> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let stores_json = serde_json::to_string(&config.stores)?;
    conn.execute(
        "INSERT INTO backup_history (id, job_id, name, backup_type, stores, include_files, compression_enabled, encryption_enabled, start_time, status, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'running', ?10)",
        params![
            id,
            job_id,
            config.name,
            config.backup_type.as_str(),
            stores_json,
            config.include_files as i64,
            config.compression_enabled as i64,
            config.encryption_enabled as i64,
            now,
            actor,
        ],
    )?;
    find_by_id(conn, &id)?
        .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created backup record"))
}

/// Seconds elapsed since the record's own start_time.
fn elapsed_secs(start_time: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(start_time)
        .map(|t| (chrono::Utc::now() - t.with_timezone(&chrono::Utc)).num_seconds().max(0))
        .unwrap_or(0)
}

/// Finalize a running record as completed. The transition is legal exactly
/// once; finalizing a record that is not `running` is an error.
pub fn finish_success(conn: &Connection, id: &str, outcome: &BackupSuccess) -> anyhow::Result<()> {
    let record = find_by_id(conn, id)?
        .ok_or_else(|| anyhow::anyhow!("Backup record not found: {}", id))?;
    let now = chrono::Utc::now().to_rfc3339();
    let duration = elapsed_secs(&record.start_time);
    let changes = conn.execute(
        "UPDATE backup_history
         SET status = 'completed', success = 1, archive_path = ?1, file_name = ?2,
             size_bytes = ?3, checksum = ?4, compression_ratio = ?5, stores_included = ?6,
             files_included = ?7, skipped_items = ?8, end_time = ?9, duration_seconds = ?10
         WHERE id = ?11 AND status = 'running'",
        params![
            outcome.archive_path,
            outcome.file_name,
            outcome.size_bytes,
            outcome.checksum,
            outcome.compression_ratio,
            serde_json::to_string(&outcome.stores_included)?,
            outcome.files_included as i64,
            serde_json::to_string(&outcome.skipped_items)?,
            now,
            duration,
            id,
        ],
    )?;
    if changes == 0 {
        anyhow::bail!("Backup record {} is not running, refusing to finalize", id);
    }
    Ok(())
}

/// Finalize a running record as failed.
pub fn finish_failure(conn: &Connection, id: &str, error_message: &str) -> anyhow::Result<()> {
    let record = find_by_id(conn, id)?
        .ok_or_else(|| anyhow::anyhow!("Backup record not found: {}", id))?;
    let now = chrono::Utc::now().to_rfc3339();
    let duration = elapsed_secs(&record.start_time);
    let changes = conn.execute(
        "UPDATE backup_history
         SET status = 'failed', success = 0, error_message = ?1, end_time = ?2, duration_seconds = ?3
         WHERE id = ?4 AND status = 'running'",
        params![error_message, now, duration, id],
    )?;
    if changes == 0 {
        anyhow::bail!("Backup record {} is not running, refusing to finalize", id);
    }
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<BackupRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM backup_history WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id], |row| row_to_record(row))?;
    Ok(rows.next().and_then(|r| r.ok()))
}

pub fn find_all(conn: &Connection, limit: i64) -> anyhow::Result<Vec<BackupRecord>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM backup_history ORDER BY start_time DESC LIMIT ?",
    )?;
    let rows = stmt.query_map(params![limit], |row| row_to_record(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Completed records for a job definition older than `cutoff` (RFC 3339).
pub fn find_expired_for_job(
    conn: &Connection,
    job_id: &str,
    cutoff: &str,
) -> anyhow::Result<Vec<BackupRecord>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM backup_history
         WHERE job_id = ? AND status = 'completed' AND start_time < ?
         ORDER BY start_time ASC",
    )?;
    let rows = stmt.query_map(params![job_id, cutoff], |row| row_to_record(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn delete(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let changes = conn.execute("DELETE FROM backup_history WHERE id = ?", params![id])?;
    Ok(changes > 0)
}
