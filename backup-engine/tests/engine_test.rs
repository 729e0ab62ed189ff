//! End-to-end engine tests: backup, restore, record lifecycle, sweeps.

use backup_engine::config::AppConfig;
use backup_engine::error::EngineError;
use backup_engine::models::backup_record::{self, BackupJobConfig, BackupType};
use backup_engine::models::restore_record::{self, RestoreConfig, RestoreType};
use backup_engine::models::{backup_job, notification};
use backup_engine::services::{
    archive, backup_service, checksum, job_sweep, restore_service, retention,
};
use backup_engine::state::AppState;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

fn build_state(tmp: &TempDir, backups_dir: Option<PathBuf>) -> Arc<AppState> {
    let data_dir = tmp.path().join("data");
    let stores_dir = data_dir.join("stores");
    let uploads_dir = data_dir.join("uploads");
    let backups_dir = backups_dir.unwrap_or_else(|| data_dir.join("backups"));
    let staging_dir = data_dir.join("staging");

    fs::create_dir_all(&stores_dir).unwrap();
    fs::create_dir_all(&staging_dir).unwrap();

    let db_path = data_dir.join("backup-engine.db");
    let pool = backup_engine::db::connection::create_pool(db_path.to_str().unwrap());
    backup_engine::db::migrate::migrate(&pool).unwrap();

    let config = AppConfig {
        data_dir,
        db_path,
        stores_dir,
        file_roots: vec![uploads_dir],
        backups_dir,
        staging_dir,
        stale_job_grace_secs: 3600,
    };
    Arc::new(AppState::new(pool, config))
}

fn test_state(tmp: &TempDir) -> Arc<AppState> {
    let state = build_state(tmp, None);
    fs::create_dir_all(&state.config.backups_dir).unwrap();
    state
}

fn write_store(state: &AppState, id: &str, content: &[u8]) {
    fs::write(state.config.stores_dir.join(format!("{}.db", id)), content).unwrap();
}

fn store_path(state: &AppState, id: &str) -> PathBuf {
    state.config.stores_dir.join(format!("{}.db", id))
}

fn backup_config(name: &str, stores: &[&str]) -> BackupJobConfig {
    BackupJobConfig {
        name: name.into(),
        backup_type: BackupType::Full,
        stores: stores.iter().map(|s| s.to_string()).collect(),
        include_files: false,
        compression_enabled: true,
        encryption_enabled: false,
    }
}

fn json_list(text: &str) -> Vec<String> {
    serde_json::from_str(text).unwrap()
}

#[tokio::test]
async fn full_backup_completes_and_verifies() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    write_store(&state, "main", &vec![b'a'; 1024]);
    write_store(&state, "audit", &vec![b'b'; 2048]);

    let outcome = backup_service::create_backup(
        state.clone(),
        backup_config("daily", &["main", "audit"]),
        "admin",
    )
    .await
    .unwrap();

    assert!(outcome.archive_path.is_file());
    assert!(outcome.size_bytes > 0);
    assert!(outcome.skipped_items.is_empty());

    // the stored digest matches an independent recomputation
    let recomputed = checksum::compute(&outcome.archive_path).unwrap();
    assert_eq!(outcome.checksum, recomputed);
    assert!(outcome.checksum.starts_with("sha256:"));

    let conn = state.db.get().unwrap();
    let record = backup_record::find_by_id(&conn, &outcome.backup_id)
        .unwrap()
        .unwrap();
    assert_eq!(record.status, "completed");
    assert_eq!(record.success, 1);
    assert_eq!(record.archive_path.as_deref(), outcome.archive_path.to_str());
    assert_eq!(record.checksum.as_deref(), Some(recomputed.as_str()));
    assert!(record.end_time.is_some());
    assert!(record.duration_seconds.is_some());
    assert_eq!(record.created_by, "admin");
    assert_eq!(
        json_list(record.stores_included.as_deref().unwrap()),
        vec!["main", "audit"]
    );
    assert_eq!(json_list(&record.skipped_items), Vec::<String>::new());

    // success notification references the backup
    let notifications = notification::find_all(&conn, 50, false).unwrap();
    assert!(notifications.iter().any(|n| {
        n.notification_type == "success" && n.backup_id.as_deref() == Some(outcome.backup_id.as_str())
    }));
}

#[tokio::test]
async fn missing_store_is_tolerated_and_recorded() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    write_store(&state, "main", b"main content");

    let outcome = backup_service::create_backup(
        state.clone(),
        backup_config("partial", &["main", "missing"]),
        "admin",
    )
    .await
    .unwrap();

    // the job completed; the absent store is simply not in the archive
    let extracted = tmp.path().join("extracted");
    archive::extract(&outcome.archive_path, &extracted).unwrap();
    assert!(extracted.join("main.db").is_file());
    assert!(!extracted.join("missing.db").exists());

    assert_eq!(outcome.skipped_items, vec!["missing".to_string()]);

    let conn = state.db.get().unwrap();
    let record = backup_record::find_by_id(&conn, &outcome.backup_id)
        .unwrap()
        .unwrap();
    assert_eq!(record.status, "completed");
    assert_eq!(json_list(&record.skipped_items), vec!["missing"]);
    assert_eq!(
        json_list(record.stores_included.as_deref().unwrap()),
        vec!["main"]
    );
}

#[tokio::test]
async fn restore_round_trip_reproduces_store_bytes() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    write_store(&state, "main", b"original payload");
    let original_digest = checksum::compute(&store_path(&state, "main")).unwrap();

    let outcome = backup_service::create_backup(
        state.clone(),
        backup_config("roundtrip", &["main"]),
        "admin",
    )
    .await
    .unwrap();

    // clobber the store, then restore over it
    write_store(&state, "main", b"corrupted afterwards");

    let restore = restore_service::restore_backup(
        state.clone(),
        &outcome.backup_id,
        RestoreConfig {
            restore_type: RestoreType::Full,
            stores_to_restore: vec!["main".into()],
            files_to_restore: false,
            overwrite_existing: true,
        },
        "admin",
    )
    .await
    .unwrap();

    assert_eq!(restore.restored_item_count, 1);
    assert!(restore.skipped_items.is_empty());

    let restored_digest = checksum::compute(&store_path(&state, "main")).unwrap();
    assert_eq!(restored_digest, original_digest);

    let conn = state.db.get().unwrap();
    let record = restore_record::find_by_id(&conn, &restore.restore_id)
        .unwrap()
        .unwrap();
    assert_eq!(record.status, "completed");
    assert_eq!(record.success, 1);
    assert_eq!(record.restored_item_count, 1);
    assert_eq!(record.backup_id, outcome.backup_id);
}

#[tokio::test]
async fn non_destructive_restore_preserves_existing_store() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    write_store(&state, "main", b"archived version");

    let outcome = backup_service::create_backup(
        state.clone(),
        backup_config("daily", &["main"]),
        "admin",
    )
    .await
    .unwrap();

    write_store(&state, "main", b"live version");

    let restore = restore_service::restore_backup(
        state.clone(),
        &outcome.backup_id,
        RestoreConfig {
            restore_type: RestoreType::Selective,
            stores_to_restore: vec!["main".into()],
            files_to_restore: false,
            overwrite_existing: false,
        },
        "admin",
    )
    .await
    .unwrap();
    assert_eq!(restore.restored_item_count, 1);

    // destination now equals the archived copy
    assert_eq!(fs::read(store_path(&state, "main")).unwrap(), b"archived version");

    // and the pre-restore content survives as a timestamped sibling
    let snapshots: Vec<_> = fs::read_dir(&state.config.stores_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.starts_with("main.db.") && name.ends_with(".bak")
        })
        .collect();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(fs::read(snapshots[0].path()).unwrap(), b"live version");
}

#[tokio::test]
async fn file_trees_are_captured_and_restored() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    write_store(&state, "main", b"store");

    let uploads = state.config.file_roots[0].clone();
    fs::create_dir_all(uploads.join("nested")).unwrap();
    fs::write(uploads.join("nested/report.txt"), b"report body").unwrap();

    let mut config = backup_config("with-files", &["main"]);
    config.include_files = true;
    let outcome = backup_service::create_backup(state.clone(), config, "admin")
        .await
        .unwrap();

    let conn = state.db.get().unwrap();
    let record = backup_record::find_by_id(&conn, &outcome.backup_id)
        .unwrap()
        .unwrap();
    assert_eq!(record.files_included, 1);
    drop(conn);

    // lose the tree, then restore it from the archive
    fs::remove_dir_all(&uploads).unwrap();

    let restore = restore_service::restore_backup(
        state.clone(),
        &outcome.backup_id,
        RestoreConfig {
            restore_type: RestoreType::Full,
            stores_to_restore: vec!["main".into()],
            files_to_restore: true,
            overwrite_existing: true,
        },
        "admin",
    )
    .await
    .unwrap();

    // one store + one tree
    assert_eq!(restore.restored_item_count, 2);
    assert_eq!(fs::read(uploads.join("nested/report.txt")).unwrap(), b"report body");
}

#[tokio::test]
async fn non_destructive_tree_restore_preserves_existing_tree() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);

    let uploads = state.config.file_roots[0].clone();
    fs::create_dir_all(&uploads).unwrap();
    fs::write(uploads.join("doc.txt"), b"archived doc").unwrap();

    let mut config = backup_config("files-only", &[]);
    config.include_files = true;
    let outcome = backup_service::create_backup(state.clone(), config, "admin")
        .await
        .unwrap();

    fs::write(uploads.join("doc.txt"), b"live doc").unwrap();

    restore_service::restore_backup(
        state.clone(),
        &outcome.backup_id,
        RestoreConfig {
            restore_type: RestoreType::Full,
            stores_to_restore: vec![],
            files_to_restore: true,
            overwrite_existing: false,
        },
        "admin",
    )
    .await
    .unwrap();

    assert_eq!(fs::read(uploads.join("doc.txt")).unwrap(), b"archived doc");

    let parent = uploads.parent().unwrap();
    let tree_snapshots: Vec<_> = fs::read_dir(parent)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.starts_with("uploads.") && name.ends_with(".bak")
        })
        .collect();
    assert_eq!(tree_snapshots.len(), 1);
    assert_eq!(
        fs::read(tree_snapshots[0].path().join("doc.txt")).unwrap(),
        b"live doc"
    );
}

#[tokio::test]
async fn restore_of_unknown_backup_creates_no_record() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);

    let result = restore_service::restore_backup(
        state.clone(),
        "no-such-backup",
        RestoreConfig {
            restore_type: RestoreType::Full,
            stores_to_restore: vec!["main".into()],
            files_to_restore: false,
            overwrite_existing: true,
        },
        "admin",
    )
    .await;

    assert!(matches!(result, Err(EngineError::NotFound(_))));

    let conn = state.db.get().unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM restore_operations", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn restore_with_missing_archive_file_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    write_store(&state, "main", b"store");

    let outcome = backup_service::create_backup(
        state.clone(),
        backup_config("doomed", &["main"]),
        "admin",
    )
    .await
    .unwrap();

    fs::remove_file(&outcome.archive_path).unwrap();

    let result = restore_service::restore_backup(
        state.clone(),
        &outcome.backup_id,
        RestoreConfig {
            restore_type: RestoreType::Full,
            stores_to_restore: vec!["main".into()],
            files_to_restore: false,
            overwrite_existing: true,
        },
        "admin",
    )
    .await;

    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn structural_failure_finalizes_record_as_failed() {
    let tmp = TempDir::new().unwrap();
    // backups_dir points at a plain file: the archive build cannot write
    let bogus = tmp.path().join("not-a-directory");
    fs::write(&bogus, b"occupied").unwrap();
    let state = build_state(&tmp, Some(bogus));
    write_store(&state, "main", b"store");

    let result = backup_service::create_backup(
        state.clone(),
        backup_config("broken", &["main"]),
        "admin",
    )
    .await;
    assert!(matches!(result, Err(EngineError::Archive(_))));

    let conn = state.db.get().unwrap();
    let records = backup_record::find_all(&conn, 10).unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.status, "failed");
    assert_eq!(record.success, 0);
    assert!(record.error_message.is_some());
    assert!(record.end_time.is_some());
    assert!(record.archive_path.is_none());

    // staging was cleaned up even on the failure path
    let leftovers = fs::read_dir(&state.config.staging_dir).unwrap().count();
    assert_eq!(leftovers, 0);

    let notifications = notification::find_all(&conn, 50, false).unwrap();
    assert!(notifications.iter().any(|n| {
        n.notification_type == "failure" && n.backup_id.as_deref() == Some(record.id.as_str())
    }));
}

#[tokio::test]
async fn record_finalization_is_single_shot() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);

    let conn = state.db.get().unwrap();
    let record = backup_record::start(&conn, &backup_config("once", &["main"]), None, "admin")
        .unwrap();
    assert_eq!(record.status, "running");

    backup_record::finish_failure(&conn, &record.id, "boom").unwrap();

    // failed -> completed is not a legal transition
    let outcome = backup_record::BackupSuccess {
        archive_path: "/tmp/x.tar".into(),
        file_name: "x.tar".into(),
        size_bytes: 1,
        checksum: "sha256:00".into(),
        compression_ratio: None,
        stores_included: vec![],
        files_included: false,
        skipped_items: vec![],
    };
    assert!(backup_record::finish_success(&conn, &record.id, &outcome).is_err());
    // and a second failure finalization is rejected too
    assert!(backup_record::finish_failure(&conn, &record.id, "again").is_err());
}

#[tokio::test]
async fn interrupted_running_records_are_swept() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);

    let conn = state.db.get().unwrap();
    let stale = backup_record::start(&conn, &backup_config("stale", &[]), None, "admin").unwrap();
    let fresh = backup_record::start(&conn, &backup_config("fresh", &[]), None, "admin").unwrap();

    // age the first record past the grace period
    let old = (chrono::Utc::now() - chrono::Duration::hours(2)).to_rfc3339();
    conn.execute(
        "UPDATE backup_history SET start_time = ?1 WHERE id = ?2",
        rusqlite::params![old, stale.id],
    )
    .unwrap();

    let swept = job_sweep::reconcile_interrupted(&state.db, 3600).unwrap();
    assert_eq!(swept, 1);

    let stale = backup_record::find_by_id(&conn, &stale.id).unwrap().unwrap();
    assert_eq!(stale.status, "failed");
    assert_eq!(stale.success, 0);
    assert!(stale.error_message.unwrap().contains("interrupted"));
    assert!(stale.duration_seconds.unwrap() >= 7000);

    let fresh = backup_record::find_by_id(&conn, &fresh.id).unwrap().unwrap();
    assert_eq!(fresh.status, "running");
}

#[tokio::test]
async fn retention_removes_only_expired_completed_backups() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    write_store(&state, "main", b"store");

    let conn = state.db.get().unwrap();
    let job = backup_job::create(
        &conn,
        &backup_job::CreateBackupJobRequest {
            name: "nightly".into(),
            job_type: "scheduled".into(),
            stores: vec!["main".into()],
            include_files: false,
            compression_enabled: true,
            encryption_enabled: false,
            schedule_cron: Some("0 0 2 * * *".into()),
            retention_days: 7,
        },
        "admin",
    )
    .unwrap();
    drop(conn);

    let old_run = backup_service::create_backup_for_job(
        state.clone(),
        job.to_config(),
        Some(job.id.clone()),
        "scheduler",
    )
    .await
    .unwrap();
    let fresh_run = backup_service::create_backup_for_job(
        state.clone(),
        job.to_config(),
        Some(job.id.clone()),
        "scheduler",
    )
    .await
    .unwrap();

    let conn = state.db.get().unwrap();
    let expired_start = (chrono::Utc::now() - chrono::Duration::days(10)).to_rfc3339();
    conn.execute(
        "UPDATE backup_history SET start_time = ?1 WHERE id = ?2",
        rusqlite::params![expired_start, old_run.backup_id],
    )
    .unwrap();

    let removed = retention::apply_retention(&conn, &job).unwrap();
    assert_eq!(removed, 1);

    assert!(backup_record::find_by_id(&conn, &old_run.backup_id).unwrap().is_none());
    assert!(!old_run.archive_path.exists());

    assert!(backup_record::find_by_id(&conn, &fresh_run.backup_id).unwrap().is_some());
    assert!(fresh_run.archive_path.exists());
}

#[tokio::test]
async fn spawned_backup_returns_id_then_completes() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    write_store(&state, "main", b"store");

    let backup_id = backup_service::spawn_backup(
        state.clone(),
        backup_config("background", &["main"]),
        "admin",
    )
    .await
    .unwrap();

    // the record exists immediately; poll it to completion
    let mut status = String::new();
    for _ in 0..100 {
        let conn = state.db.get().unwrap();
        let record = backup_record::find_by_id(&conn, &backup_id).unwrap().unwrap();
        status = record.status.clone();
        if status != "running" {
            break;
        }
        drop(conn);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert_eq!(status, "completed");
}

#[tokio::test]
async fn notifications_can_be_listed_and_acknowledged() {
    let tmp = TempDir::new().unwrap();
    let state = test_state(&tmp);
    write_store(&state, "main", b"store");

    backup_service::create_backup(state.clone(), backup_config("noisy", &["main"]), "admin")
        .await
        .unwrap();

    let conn = state.db.get().unwrap();
    let unread = notification::find_all(&conn, 50, true).unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].is_read, 0);

    assert!(notification::mark_read(&conn, &unread[0].id).unwrap());
    assert!(notification::find_all(&conn, 50, true).unwrap().is_empty());
    assert_eq!(notification::find_all(&conn, 50, false).unwrap().len(), 1);
}
