use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub type DbPool = Pool<SqliteConnectionManager>;

pub fn create_pool(db_path: &str) -> DbPool {
    // Job records, notifications, and the scheduler all write through this
    // pool; the busy timeout keeps concurrent finalizations from failing
    // with SQLITE_BUSY.
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode = DELETE;
             PRAGMA synchronous = FULL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
    });

    Pool::builder()
        .max_size(4)
        .build(manager)
        .expect("Failed to create DB pool")
}

pub fn close_pool(pool: &DbPool) {
    // r2d2 closes connections when the pool is dropped.
    // Attempt a checkpoint just in case (no-op in DELETE mode).
    if let Ok(conn) = pool.get() {
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
    }
}
