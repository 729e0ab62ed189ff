use crate::models::backup_record::{BackupJobConfig, BackupType};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A saved backup job definition. Scheduled definitions are materialized
/// into a `BackupJobConfig` every time their cron expression fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupJob {
    pub id: String,
    pub name: String,
    pub job_type: String,
    pub backup_type: String,
    pub stores: String, // JSON array stored as text
    pub include_files: i64,
    pub compression_enabled: i64,
    pub encryption_enabled: i64,
    pub schedule_cron: Option<String>,
    pub retention_days: i64,
    pub enabled: i64,
    pub last_run_at: Option<String>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

impl BackupJob {
    /// Build the runtime configuration this definition describes.
    pub fn to_config(&self) -> BackupJobConfig {
        BackupJobConfig {
            name: self.name.clone(),
            backup_type: BackupType::Full,
            stores: serde_json::from_str(&self.stores).unwrap_or_default(),
            include_files: self.include_files != 0,
            compression_enabled: self.compression_enabled != 0,
            encryption_enabled: self.encryption_enabled != 0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBackupJobRequest {
    pub name: String,
    #[serde(default = "default_job_type")]
    pub job_type: String,
    #[serde(default)]
    pub stores: Vec<String>,
    #[serde(default)]
    pub include_files: bool,
    #[serde(default = "default_compression")]
    pub compression_enabled: bool,
    #[serde(default)]
    pub encryption_enabled: bool,
    pub schedule_cron: Option<String>,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_job_type() -> String {
    "manual".into()
}
fn default_compression() -> bool {
    true
}
fn default_retention_days() -> i64 {
    30
}

fn row_to_job(row: &Row) -> rusqlite::Result<BackupJob> {
    Ok(BackupJob {
        id: row.get("id")?,
        name: row.get("name")?,
        job_type: row.get("job_type")?,
        backup_type: row.get("backup_type")?,
        stores: row.get("stores")?,
        include_files: row.get("include_files")?,
        compression_enabled: row.get("compression_enabled")?,
        encryption_enabled: row.get("encryption_enabled")?,
        schedule_cron: row.get("schedule_cron")?,
        retention_days: row.get("retention_days")?,
        enabled: row.get("enabled")?,
        last_run_at: row.get("last_run_at")?,
        created_by: row.get("created_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn find_all(conn: &Connection) -> anyhow::Result<Vec<BackupJob>> {
    let mut stmt = conn.prepare("SELECT * FROM backup_jobs ORDER BY created_at DESC")?;
    let rows = stmt.query_map([], |row| row_to_job(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn find_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<BackupJob>> {
    let mut stmt = conn.prepare("SELECT * FROM backup_jobs WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id], |row| row_to_job(row))?;
    Ok(rows.next().and_then(|r| r.ok()))
}

pub fn create(conn: &Connection, data: &CreateBackupJobRequest, actor: &str) -> anyhow::Result<BackupJob> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let stores_json = serde_json::to_string(&data.stores)?;
    conn.execute(
        "INSERT INTO backup_jobs (id, name, job_type, stores, include_files, compression_enabled, encryption_enabled, schedule_cron, retention_days, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            id,
            data.name,
            data.job_type,
            stores_json,
            data.include_files as i64,
            data.compression_enabled as i64,
            data.encryption_enabled as i64,
            data.schedule_cron,
            data.retention_days,
            actor,
            now,
            now,
        ],
    )?;
    find_by_id(conn, &id)?
        .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created job"))
}

pub fn touch_last_run(conn: &Connection, id: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE backup_jobs SET last_run_at = ?, updated_at = datetime('now') WHERE id = ?",
        params![chrono::Utc::now().to_rfc3339(), id],
    )?;
    Ok(())
}

pub fn set_enabled(conn: &Connection, id: &str, enabled: bool) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE backup_jobs SET enabled = ?, updated_at = datetime('now') WHERE id = ?",
        params![enabled as i64, id],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let changes = conn.execute("DELETE FROM backup_jobs WHERE id = ?", params![id])?;
    Ok(changes > 0)
}
