//! Restore orchestration, the mirror of the backup path.
//!
//! Given a completed backup record, the archive is extracted into a
//! job-scoped staging directory and the requested stores and file trees
//! are copied back into their canonical locations. Unless overwrite was
//! requested, existing data is preserved as timestamped siblings before
//! being replaced. The same partial-tolerance policy applies: per-item
//! failures are recorded as skipped, structural failures fail the job.

use crate::error::EngineError;
use crate::models::notification::NewNotification;
use crate::models::restore_record::{self, RestoreConfig, RestoreSuccess};
use crate::models::{backup_record, backup_record::BackupRecord};
use crate::services::{archive, dir_copy, notify, store_snapshot};
use crate::state::AppState;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
pub struct RestoreOutcome {
    pub restore_id: String,
    pub restored_item_count: i64,
    pub skipped_items: Vec<String>,
}

/// Run a restore to completion and return its outcome.
///
/// Fails with `NotFound`, without creating a restore record, when the
/// referenced backup does not exist, never completed, or its archive file
/// is gone from disk.
pub async fn restore_backup(
    state: Arc<AppState>,
    backup_id: &str,
    config: RestoreConfig,
    actor: &str,
) -> Result<RestoreOutcome, EngineError> {
    let (backup, archive_path) = lookup_backup(&state, backup_id).await?;
    let record = start_record(&state, &backup.id, &config, actor).await?;
    run_to_completion(state, record.id, archive_path, config).await
}

/// Create the running record, then run the restore on a background task.
pub async fn spawn_restore(
    state: Arc<AppState>,
    backup_id: &str,
    config: RestoreConfig,
    actor: &str,
) -> Result<String, EngineError> {
    let (backup, archive_path) = lookup_backup(&state, backup_id).await?;
    let record = start_record(&state, &backup.id, &config, actor).await?;
    let restore_id = record.id.clone();

    let id = restore_id.clone();
    tokio::spawn(async move {
        if let Err(e) = run_to_completion(state, id, archive_path, config).await {
            tracing::error!(error = %e, "Background restore failed");
        }
    });

    Ok(restore_id)
}

async fn lookup_backup(
    state: &Arc<AppState>,
    backup_id: &str,
) -> Result<(BackupRecord, PathBuf), EngineError> {
    let db = state.db.clone();
    let id = backup_id.to_string();
    let record = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        backup_record::find_by_id(&conn, &id)
    })
    .await
    .map_err(anyhow::Error::from)??;

    let record = record
        .ok_or_else(|| EngineError::NotFound(format!("Backup not found: {}", backup_id)))?;
    let archive_path = record
        .archive_path
        .clone()
        .map(PathBuf::from)
        .ok_or_else(|| {
            EngineError::NotFound(format!("Backup {} has no archive to restore from", backup_id))
        })?;
    if !archive_path.is_file() {
        return Err(EngineError::NotFound(format!(
            "Backup archive missing on disk: {}",
            archive_path.display()
        )));
    }
    Ok((record, archive_path))
}

async fn start_record(
    state: &Arc<AppState>,
    backup_id: &str,
    config: &RestoreConfig,
    actor: &str,
) -> Result<restore_record::RestoreRecord, EngineError> {
    let db = state.db.clone();
    let bid = backup_id.to_string();
    let cfg = config.clone();
    let actor = actor.to_string();
    let record = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        restore_record::start(&conn, &bid, &cfg, &actor)
    })
    .await
    .map_err(anyhow::Error::from)??;
    Ok(record)
}

async fn run_to_completion(
    state: Arc<AppState>,
    restore_id: String,
    archive_path: PathBuf,
    config: RestoreConfig,
) -> Result<RestoreOutcome, EngineError> {
    tracing::info!(restore_id = %restore_id, archive = %archive_path.display(), "Starting restore");

    let permit = state
        .job_gate
        .clone()
        .acquire_owned()
        .await
        .map_err(anyhow::Error::from)?;

    let staging = state.config.staging_dir.join(format!(
        "restore_{}_{}",
        restore_id,
        chrono::Utc::now().format("%Y%m%d%H%M%S")
    ));

    let result = execute(&state, &restore_id, &archive_path, &config, &staging).await;

    if staging.exists() {
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            tracing::warn!(staging = %staging.display(), error = %e, "Failed to remove staging directory");
        }
    }
    drop(permit);

    match result {
        Ok(outcome) => {
            tracing::info!(
                restore_id = %restore_id,
                restored = outcome.restored_item_count,
                "Restore completed"
            );
            notify::emit(
                state.db.clone(),
                NewNotification {
                    notification_type: "success",
                    title: "Restore Completed Successfully".into(),
                    message: format!(
                        "Restore operation completed. {} items restored.",
                        outcome.restored_item_count
                    ),
                    backup_id: None,
                    restore_id: Some(restore_id),
                },
            )
            .await;
            Ok(outcome)
        }
        Err(e) => {
            tracing::error!(restore_id = %restore_id, error = %e, "Restore failed");
            finalize_failure(&state, &restore_id, &e.to_string()).await;
            notify::emit(
                state.db.clone(),
                NewNotification {
                    notification_type: "failure",
                    title: "Restore Failed".into(),
                    message: format!("Restore operation failed: {}", e),
                    backup_id: None,
                    restore_id: Some(restore_id),
                },
            )
            .await;
            Err(e)
        }
    }
}

async fn execute(
    state: &Arc<AppState>,
    restore_id: &str,
    archive_path: &Path,
    config: &RestoreConfig,
    staging: &Path,
) -> Result<RestoreOutcome, EngineError> {
    // Extraction is structural: a corrupt container fails the whole job.
    let archive_owned = archive_path.to_path_buf();
    let staging_owned = staging.to_path_buf();
    tokio::task::spawn_blocking(move || archive::extract(&archive_owned, &staging_owned))
        .await
        .map_err(anyhow::Error::from)??;

    let mut restored_count: i64 = 0;
    let mut skipped = Vec::new();

    for store_id in &config.stores_to_restore {
        let lock = state.store_lock(store_id);
        let _guard = lock.lock().await;

        let stores_dir = state.config.stores_dir.clone();
        let sid = store_id.clone();
        let source = staging.to_path_buf();
        let overwrite = config.overwrite_existing;
        let restored = tokio::task::spawn_blocking(move || {
            store_snapshot::restore_store(&stores_dir, &sid, &source, overwrite)
        })
        .await
        .map_err(anyhow::Error::from)?;

        match restored {
            Ok(true) => {
                tracing::info!(store = %store_id, "Store restored");
                restored_count += 1;
            }
            Ok(false) => skipped.push(store_id.clone()),
            // Same partial-tolerance policy as backup.
            Err(e) => {
                tracing::warn!(store = %store_id, error = %e, "Store restore failed, continuing");
                skipped.push(store_id.clone());
            }
        }
    }

    if config.files_to_restore {
        let staged_files = staging.join("files");
        for root in &state.config.file_roots {
            let tree_name = tree_label(root);
            let tree_src = staged_files.join(&tree_name);
            if !tree_src.is_dir() {
                continue;
            }

            let source = tree_src.clone();
            let dest = root.clone();
            let overwrite = config.overwrite_existing;
            let restored = tokio::task::spawn_blocking(move || {
                restore_tree(&source, &dest, overwrite)
            })
            .await
            .map_err(anyhow::Error::from)?;

            match restored {
                Ok(()) => {
                    tracing::info!(tree = %tree_name, "File tree restored");
                    restored_count += 1;
                }
                Err(e) => {
                    tracing::warn!(tree = %tree_name, error = %e, "File tree restore failed, continuing");
                    skipped.push(format!("files/{}", tree_name));
                }
            }
        }
    }

    let db = state.db.clone();
    let id = restore_id.to_string();
    let outcome_row = RestoreSuccess {
        restored_item_count: restored_count,
        skipped_items: skipped.clone(),
    };
    tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        restore_record::finish_success(&conn, &id, &outcome_row)
    })
    .await
    .map_err(anyhow::Error::from)??;

    Ok(RestoreOutcome {
        restore_id: restore_id.to_string(),
        restored_item_count: restored_count,
        skipped_items: skipped,
    })
}

/// Copy a staged tree over its destination, preserving the pre-restore
/// tree as a timestamped sibling unless overwrite was requested.
fn restore_tree(source: &Path, dest: &Path, overwrite: bool) -> std::io::Result<()> {
    if dest.exists() && !overwrite {
        let millis = chrono::Utc::now().timestamp_millis();
        let aside = PathBuf::from(format!("{}.{}.bak", dest.display(), millis));
        dir_copy::copy_tree(dest, &aside)?;
        tracing::info!(snapshot = %aside.display(), "Existing tree preserved before restore");
    }
    dir_copy::copy_tree(source, dest)
}

async fn finalize_failure(state: &Arc<AppState>, restore_id: &str, error_message: &str) {
    let db = state.db.clone();
    let id = restore_id.to_string();
    let msg = error_message.to_string();
    let result = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        restore_record::finish_failure(&conn, &id, &msg)
    })
    .await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(restore_id = %restore_id, error = %e, "Failed to finalize restore record")
        }
        Err(e) => tracing::error!(restore_id = %restore_id, error = %e, "Finalize task panicked"),
    }
}

fn tree_label(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".into())
}
