//! Backup orchestration.
//!
//! A backup job is tracked as a durable record from the moment it starts:
//! the record is created as `running`, the requested stores and file trees
//! are staged into a job-scoped directory, the staging area is packaged
//! into a single archive, the archive is digested, and the record is
//! finalized exactly once as `completed` or `failed`. Per-item copy
//! failures are tolerated (a backup covering nine of ten requested stores
//! is more useful than none) while structural failures in staging, archive
//! build, or digest abort the whole job.

use crate::error::EngineError;
use crate::models::backup_record::{self, BackupJobConfig, BackupSuccess};
use crate::models::notification::NewNotification;
use crate::services::{archive, checksum, dir_copy, notify, store_snapshot};
use crate::state::AppState;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
pub struct BackupOutcome {
    pub backup_id: String,
    pub archive_path: PathBuf,
    pub size_bytes: u64,
    pub checksum: String,
    pub skipped_items: Vec<String>,
}

/// Run a backup to completion and return its outcome.
pub async fn create_backup(
    state: Arc<AppState>,
    config: BackupJobConfig,
    actor: &str,
) -> Result<BackupOutcome, EngineError> {
    create_backup_for_job(state, config, None, actor).await
}

/// Same as [`create_backup`], attributing the record to a saved job
/// definition (scheduler path).
pub async fn create_backup_for_job(
    state: Arc<AppState>,
    config: BackupJobConfig,
    job_id: Option<String>,
    actor: &str,
) -> Result<BackupOutcome, EngineError> {
    let record = start_record(&state, &config, job_id, actor).await?;
    run_to_completion(state, record.id, config).await
}

/// Create the running record, then run the backup on a background task.
/// The caller gets the record id immediately and observes progress by
/// polling the record.
pub async fn spawn_backup(
    state: Arc<AppState>,
    config: BackupJobConfig,
    actor: &str,
) -> Result<String, EngineError> {
    let record = start_record(&state, &config, None, actor).await?;
    let backup_id = record.id.clone();

    let id = backup_id.clone();
    tokio::spawn(async move {
        if let Err(e) = run_to_completion(state, id, config).await {
            tracing::error!(error = %e, "Background backup failed");
        }
    });

    Ok(backup_id)
}

async fn start_record(
    state: &Arc<AppState>,
    config: &BackupJobConfig,
    job_id: Option<String>,
    actor: &str,
) -> Result<backup_record::BackupRecord, EngineError> {
    let db = state.db.clone();
    let cfg = config.clone();
    let actor = actor.to_string();
    let record = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        backup_record::start(&conn, &cfg, job_id.as_deref(), &actor)
    })
    .await
    .map_err(anyhow::Error::from)??;
    Ok(record)
}

async fn run_to_completion(
    state: Arc<AppState>,
    backup_id: String,
    config: BackupJobConfig,
) -> Result<BackupOutcome, EngineError> {
    tracing::info!(backup_id = %backup_id, name = %config.name, "Starting backup");

    let permit = state
        .job_gate
        .clone()
        .acquire_owned()
        .await
        .map_err(anyhow::Error::from)?;

    let staging = state.config.staging_dir.join(format!(
        "backup_{}_{}",
        backup_id,
        chrono::Utc::now().format("%Y%m%d%H%M%S")
    ));

    let result = execute(&state, &backup_id, &config, &staging).await;

    // Scoped cleanup, success or failure alike.
    if staging.exists() {
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            tracing::warn!(staging = %staging.display(), error = %e, "Failed to remove staging directory");
        }
    }
    drop(permit);

    match result {
        Ok(outcome) => {
            tracing::info!(
                backup_id = %backup_id,
                archive = %outcome.archive_path.display(),
                size_bytes = outcome.size_bytes,
                "Backup completed"
            );
            notify::emit(
                state.db.clone(),
                NewNotification {
                    notification_type: "success",
                    title: "Backup Completed Successfully".into(),
                    message: format!(
                        "Backup \"{}\" completed. Size: {}",
                        config.name,
                        notify::format_bytes(outcome.size_bytes)
                    ),
                    backup_id: Some(backup_id),
                    restore_id: None,
                },
            )
            .await;
            Ok(outcome)
        }
        Err(e) => {
            tracing::error!(backup_id = %backup_id, error = %e, "Backup failed");
            finalize_failure(&state, &backup_id, &e.to_string()).await;
            notify::emit(
                state.db.clone(),
                NewNotification {
                    notification_type: "failure",
                    title: "Backup Failed".into(),
                    message: format!("Backup \"{}\" failed: {}", config.name, e),
                    backup_id: Some(backup_id),
                    restore_id: None,
                },
            )
            .await;
            Err(e)
        }
    }
}

async fn execute(
    state: &Arc<AppState>,
    backup_id: &str,
    config: &BackupJobConfig,
    staging: &Path,
) -> Result<BackupOutcome, EngineError> {
    tokio::fs::create_dir_all(staging).await?;

    let mut stores_included = Vec::new();
    let mut skipped = Vec::new();

    for store_id in &config.stores {
        let lock = state.store_lock(store_id);
        let _guard = lock.lock().await;

        let stores_dir = state.config.stores_dir.clone();
        let sid = store_id.clone();
        let target = staging.to_path_buf();
        let staged = tokio::task::spawn_blocking(move || {
            store_snapshot::backup_store(&stores_dir, &sid, &target)
        })
        .await
        .map_err(anyhow::Error::from)?;

        match staged {
            Ok(Some(path)) => {
                tracing::info!(store = %store_id, staged = %path.display(), "Store staged");
                stores_included.push(store_id.clone());
            }
            Ok(None) => skipped.push(store_id.clone()),
            // Per-store failures do not abort the job; the remaining stores
            // are still attempted.
            Err(e) => {
                tracing::warn!(store = %store_id, error = %e, "Store snapshot failed, continuing");
                skipped.push(store_id.clone());
            }
        }
    }

    let mut files_included = false;
    if config.include_files {
        let files_dir = staging.join("files");
        for root in &state.config.file_roots {
            if !root.is_dir() {
                continue;
            }
            let tree_name = tree_label(root);
            let source = root.clone();
            let target = files_dir.join(&tree_name);
            let copied = tokio::task::spawn_blocking(move || dir_copy::copy_tree(&source, &target))
                .await
                .map_err(anyhow::Error::from)?;
            match copied {
                Ok(()) => {
                    tracing::info!(tree = %tree_name, "File tree staged");
                    files_included = true;
                }
                Err(e) => {
                    tracing::warn!(tree = %tree_name, error = %e, "File tree staging failed, continuing");
                    skipped.push(format!("files/{}", tree_name));
                }
            }
        }
    }

    // Archive build and digest are structural: a failure here fails the job.
    let staging_owned = staging.to_path_buf();
    let archive_dir = state.config.backups_dir.clone();
    let name_hint = config.name.clone();
    let compress = config.compression_enabled;
    let (archive_path, size_bytes, digest, ratio) = tokio::task::spawn_blocking(move || {
        let staged_bytes = dir_copy::tree_size(&staging_owned)?;
        let archive_path = archive::build(&staging_owned, &name_hint, compress, &archive_dir)?;
        let digest = checksum::compute(&archive_path).map_err(|e| {
            EngineError::Checksum(format!("failed to digest {}: {}", archive_path.display(), e))
        })?;
        let size_bytes = std::fs::metadata(&archive_path)?.len();
        let ratio = (staged_bytes > 0).then(|| size_bytes as f64 / staged_bytes as f64);
        Ok::<_, EngineError>((archive_path, size_bytes, digest, ratio))
    })
    .await
    .map_err(anyhow::Error::from)??;

    let db = state.db.clone();
    let id = backup_id.to_string();
    let outcome_row = BackupSuccess {
        archive_path: archive_path.to_string_lossy().to_string(),
        file_name: archive_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        size_bytes: size_bytes as i64,
        checksum: digest.clone(),
        compression_ratio: ratio,
        stores_included: stores_included.clone(),
        files_included,
        skipped_items: skipped.clone(),
    };
    tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        backup_record::finish_success(&conn, &id, &outcome_row)
    })
    .await
    .map_err(anyhow::Error::from)??;

    Ok(BackupOutcome {
        backup_id: backup_id.to_string(),
        archive_path,
        size_bytes,
        checksum: digest,
        skipped_items: skipped,
    })
}

async fn finalize_failure(state: &Arc<AppState>, backup_id: &str, error_message: &str) {
    let db = state.db.clone();
    let id = backup_id.to_string();
    let msg = error_message.to_string();
    let result = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        backup_record::finish_failure(&conn, &id, &msg)
    })
    .await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::error!(backup_id = %backup_id, error = %e, "Failed to finalize backup record")
        }
        Err(e) => tracing::error!(backup_id = %backup_id, error = %e, "Finalize task panicked"),
    }
}

fn tree_label(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".into())
}
