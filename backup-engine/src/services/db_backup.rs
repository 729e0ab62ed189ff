//! Daily safety copy of the engine's own metadata database.

use std::path::Path;

const MAX_SNAPSHOTS: usize = 7;
const SNAPSHOT_PREFIX: &str = "backup-engine-";

pub fn snapshot_metadata_db(db_path: &Path, data_dir: &Path) -> anyhow::Result<()> {
    let snapshot_dir = data_dir.join("db-snapshots");
    std::fs::create_dir_all(&snapshot_dir)?;

    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let snapshot_name = format!("{}{}.db", SNAPSHOT_PREFIX, today);
    let snapshot_path = snapshot_dir.join(&snapshot_name);

    if snapshot_path.exists() {
        tracing::debug!("[DB Snapshot] Today's snapshot already exists, skipping");
        return Ok(());
    }

    std::fs::copy(db_path, &snapshot_path)?;
    tracing::info!("[DB Snapshot] Created snapshot: {}", snapshot_name);

    // Prune old snapshots
    let mut snapshots: Vec<_> = std::fs::read_dir(&snapshot_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(SNAPSHOT_PREFIX))
        .collect();

    snapshots.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

    for old in snapshots.into_iter().skip(MAX_SNAPSHOTS) {
        let _ = std::fs::remove_file(old.path());
        tracing::info!(
            "[DB Snapshot] Removed old snapshot: {}",
            old.file_name().to_string_lossy()
        );
    }

    Ok(())
}
