use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreType {
    #[default]
    Full,
    Selective,
}

impl RestoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreType::Full => "full",
            RestoreType::Selective => "selective",
        }
    }
}

/// Caller-supplied configuration for one restore operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreConfig {
    #[serde(default)]
    pub restore_type: RestoreType,
    #[serde(default)]
    pub stores_to_restore: Vec<String>,
    #[serde(default)]
    pub files_to_restore: bool,
    #[serde(default)]
    pub overwrite_existing: bool,
}

// ── RestoreRecord ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreRecord {
    pub id: String,
    pub backup_id: String,
    pub restore_type: String,
    pub target_location: String,
    pub stores_to_restore: String, // JSON array stored as text
    pub files_to_restore: i64,
    pub overwrite_existing: i64,
    pub restored_item_count: i64,
    pub skipped_items: String, // JSON array stored as text
    pub start_time: String,
    pub end_time: Option<String>,
    pub duration_seconds: Option<i64>,
    pub status: String,
    pub success: i64,
    pub created_by: String,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RestoreSuccess {
    pub restored_item_count: i64,
    pub skipped_items: Vec<String>,
}

fn row_to_record(row: &Row) -> rusqlite::Result<RestoreRecord> {
    Ok(RestoreRecord {
        id: row.get("id")?,
        backup_id: row.get("backup_id")?,
        restore_type: row.get("restore_type")?,
        target_location: row.get("target_location")?,
        stores_to_restore: row.get("stores_to_restore")?,
        files_to_restore: row.get("files_to_restore")?,
        overwrite_existing: row.get("overwrite_existing")?,
        restored_item_count: row.get("restored_item_count")?,
        skipped_items: row.get("skipped_items")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        duration_seconds: row.get("duration_seconds")?,
        status: row.get("status")?,
        success: row.get("success")?,
        created_by: row.get("created_by")?,
        error_message: row.get("error_message")?,
    })
}

pub fn start(
    conn: &Connection,
    backup_id: &str,
    config: &RestoreConfig,
    actor: &str,
) -> anyhow::Result<RestoreRecord> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let stores_json = serde_json::to_string(&config.stores_to_restore)?;
    conn.execute(
        "INSERT INTO restore_operations (id, backup_id, restore_type, target_location, stores_to_restore, files_to_restore, overwrite_existing, start_time, status, created_by)
         VALUES (?1, ?2, ?3, 'current', ?4, ?5, ?6, ?7, 'running', ?8)",
        params![
            id,
            backup_id,
            config.restore_type.as_str(),
            stores_json,
            config.files_to_restore as i64,
            config.overwrite_existing as i64,
            now,
            actor,
        ],
    )?;
    find_by_id(conn, &id)?
        .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created restore record"))
}

fn elapsed_secs(start_time: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(start_time)
        .map(|t| (chrono::Utc::now() - t.with_timezone(&chrono::Utc)).num_seconds().max(0))
        .unwrap_or(0)
}

pub fn finish_success(conn: &Connection, id: &str, outcome: &RestoreSuccess) -> anyhow::Result<()> {
    let record = find_by_id(conn, id)?
        .ok_or_else(|| anyhow::anyhow!("Restore record not found: {}", id))?;
    let now = chrono::Utc::now().to_rfc3339();
    let duration = elapsed_secs(&record.start_time);
    let changes = conn.execute(
        "UPDATE restore_operations
         SET status = 'completed', success = 1, restored_item_count = ?1, skipped_items = ?2,
             end_time = ?3, duration_seconds = ?4
         WHERE id = ?5 AND status = 'running'",
        params![
            outcome.restored_item_count,
            serde_json::to_string(&outcome.skipped_items)?,
            now,
            duration,
            id,
        ],
    )?;
    if changes == 0 {
        anyhow::bail!("Restore record {} is not running, refusing to finalize", id);
    }
    Ok(())
}

pub fn finish_failure(conn: &Connection, id: &str, error_message: &str) -> anyhow::Result<()> {
    let record = find_by_id(conn, id)?
        .ok_or_else(|| anyhow::anyhow!("Restore record not found: {}", id))?;
    let now = chrono::Utc::now().to_rfc3339();
    let duration = elapsed_secs(&record.start_time);
    let changes = conn.execute(
        "UPDATE restore_operations
         SET status = 'failed', success = 0, error_message = ?1, end_time = ?2, duration_seconds = ?3
         WHERE id = ?4 AND status = 'running'",
        params![error_message, now, duration, id],
    )?;
    if changes == 0 {
        anyhow::bail!("Restore record {} is not running, refusing to finalize", id);
    }
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<RestoreRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM restore_operations WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id], |row| row_to_record(row))?;
    Ok(rows.next().and_then(|r| r.ok()))
}

pub fn find_by_backup_id(conn: &Connection, backup_id: &str) -> anyhow::Result<Vec<RestoreRecord>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM restore_operations WHERE backup_id = ? ORDER BY start_time DESC",
    )?;
    let rows = stmt.query_map(params![backup_id], |row| row_to_record(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}
