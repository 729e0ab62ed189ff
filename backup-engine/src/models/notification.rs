use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub backup_id: Option<String>,
    pub restore_id: Option<String>,
    pub is_read: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub notification_type: &'static str, // "success" | "failure" | "info"
    pub title: String,
    pub message: String,
    pub backup_id: Option<String>,
    pub restore_id: Option<String>,
}

fn row_to_notification(row: &Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get("id")?,
        notification_type: row.get("notification_type")?,
        title: row.get("title")?,
        message: row.get("message")?,
        backup_id: row.get("backup_id")?,
        restore_id: row.get("restore_id")?,
        is_read: row.get("is_read")?,
        created_at: row.get("created_at")?,
    })
}

pub fn create(conn: &Connection, data: &NewNotification) -> anyhow::Result<()> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO backup_notifications (id, notification_type, title, message, backup_id, restore_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            data.notification_type,
            data.title,
            data.message,
            data.backup_id,
            data.restore_id,
            now,
        ],
    )?;
    Ok(())
}

pub fn find_all(conn: &Connection, limit: i64, unread_only: bool) -> anyhow::Result<Vec<Notification>> {
    let sql = if unread_only {
        "SELECT * FROM backup_notifications WHERE is_read = 0 ORDER BY created_at DESC LIMIT ?"
    } else {
        "SELECT * FROM backup_notifications ORDER BY created_at DESC LIMIT ?"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![limit], |row| row_to_notification(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn mark_read(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let changes = conn.execute(
        "UPDATE backup_notifications SET is_read = 1 WHERE id = ?",
        params![id],
    )?;
    Ok(changes > 0)
}
