//! Fire-and-forget outcome notifications.
//!
//! A notification failure must never fail or roll back the job it
//! describes; every error here is logged and swallowed.

use crate::db::connection::DbPool;
use crate::models::notification::{self, NewNotification};

pub async fn emit(db: DbPool, data: NewNotification) {
    let title = data.title.clone();
    let result = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        notification::create(&conn, &data)
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(title = %title, error = %e, "Failed to persist notification"),
        Err(e) => tracing::warn!(title = %title, error = %e, "Notification task panicked"),
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 B".into();
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}
