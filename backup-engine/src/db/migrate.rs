use crate::db::connection::DbPool;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS backup_jobs (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  job_type TEXT NOT NULL DEFAULT 'manual' CHECK(job_type IN ('manual','scheduled')),
  backup_type TEXT NOT NULL DEFAULT 'full',
  stores TEXT NOT NULL DEFAULT '[]',
  include_files INTEGER NOT NULL DEFAULT 0,
  compression_enabled INTEGER NOT NULL DEFAULT 1,
  encryption_enabled INTEGER NOT NULL DEFAULT 0,
  schedule_cron TEXT,
  retention_days INTEGER NOT NULL DEFAULT 30,
  enabled INTEGER NOT NULL DEFAULT 1,
  last_run_at TEXT,
  created_by TEXT NOT NULL DEFAULT 'system',
  created_at TEXT NOT NULL DEFAULT (datetime('now')),
  updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS backup_history (
  id TEXT PRIMARY KEY,
  job_id TEXT REFERENCES backup_jobs(id) ON DELETE SET NULL,
  name TEXT NOT NULL,
  backup_type TEXT NOT NULL DEFAULT 'full',
  stores TEXT NOT NULL DEFAULT '[]',
  include_files INTEGER NOT NULL DEFAULT 0,
  compression_enabled INTEGER NOT NULL DEFAULT 1,
  encryption_enabled INTEGER NOT NULL DEFAULT 0,
  retention_days INTEGER,
  archive_path TEXT,
  file_name TEXT,
  size_bytes INTEGER,
  compression_ratio REAL,
  stores_included TEXT,
  files_included INTEGER NOT NULL DEFAULT 0,
  skipped_items TEXT NOT NULL DEFAULT '[]',
  start_time TEXT NOT NULL,
  end_time TEXT,
  duration_seconds INTEGER,
  status TEXT NOT NULL DEFAULT 'running' CHECK(status IN ('running','completed','failed')),
  success INTEGER NOT NULL DEFAULT 0,
  checksum TEXT,
  created_by TEXT NOT NULL,
  error_message TEXT
);

CREATE TABLE IF NOT EXISTS restore_operations (
  id TEXT PRIMARY KEY,
  backup_id TEXT NOT NULL REFERENCES backup_history(id) ON DELETE CASCADE,
  restore_type TEXT NOT NULL DEFAULT 'full' CHECK(restore_type IN ('full','selective')),
  target_location TEXT NOT NULL DEFAULT 'current',
  stores_to_restore TEXT NOT NULL DEFAULT '[]',
  files_to_restore INTEGER NOT NULL DEFAULT 0,
  overwrite_existing INTEGER NOT NULL DEFAULT 0,
  restored_item_count INTEGER NOT NULL DEFAULT 0,
  skipped_items TEXT NOT NULL DEFAULT '[]',
  start_time TEXT NOT NULL,
  end_time TEXT,
  duration_seconds INTEGER,
  status TEXT NOT NULL DEFAULT 'running' CHECK(status IN ('running','completed','failed')),
  success INTEGER NOT NULL DEFAULT 0,
  created_by TEXT NOT NULL,
  error_message TEXT
);

CREATE TABLE IF NOT EXISTS backup_notifications (
  id TEXT PRIMARY KEY,
  notification_type TEXT NOT NULL CHECK(notification_type IN ('success','failure','info')),
  title TEXT NOT NULL,
  message TEXT NOT NULL,
  backup_id TEXT,
  restore_id TEXT,
  is_read INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_backup_history_status ON backup_history(status);
CREATE INDEX IF NOT EXISTS idx_backup_history_start_time ON backup_history(start_time DESC);
CREATE INDEX IF NOT EXISTS idx_restore_operations_backup_id ON restore_operations(backup_id);
CREATE INDEX IF NOT EXISTS idx_backup_notifications_is_read ON backup_notifications(is_read);
"#;

pub fn migrate(pool: &DbPool) -> anyhow::Result<()> {
    tracing::info!("[DB] Starting database migration...");

    let conn = pool.get()?;
    conn.execute_batch(SCHEMA)?;

    // Idempotent migrations for existing databases
    let has_column = |table: &str, column: &str| -> bool {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", table))
            .unwrap();
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        columns.contains(&column.to_string())
    };

    // skipped_items landed after the first release
    if !has_column("backup_history", "skipped_items") {
        conn.execute_batch(
            "ALTER TABLE backup_history ADD COLUMN skipped_items TEXT NOT NULL DEFAULT '[]'",
        )?;
    }
    if !has_column("restore_operations", "skipped_items") {
        conn.execute_batch(
            "ALTER TABLE restore_operations ADD COLUMN skipped_items TEXT NOT NULL DEFAULT '[]'",
        )?;
    }
    if !has_column("backup_history", "compression_ratio") {
        conn.execute_batch("ALTER TABLE backup_history ADD COLUMN compression_ratio REAL")?;
    }

    tracing::info!("[DB] Migration completed successfully");
    Ok(())
}
