//! Cron-driven execution of saved backup job definitions.

use crate::models::backup_job;
use crate::services::{backup_service, retention};
use crate::state::AppState;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

pub struct BackupScheduler {
    scheduler: Mutex<JobScheduler>,
    state: Arc<AppState>,
}

impl BackupScheduler {
    pub async fn new(state: Arc<AppState>) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            state,
        })
    }

    pub async fn schedule_job(&self, job_id: &str, cron_expression: &str) -> anyhow::Result<()> {
        let state = self.state.clone();
        let jid = job_id.to_string();

        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let state = state.clone();
            let jid = jid.clone();
            Box::pin(async move {
                run_scheduled(state, jid).await;
            })
        })?;

        self.scheduler.lock().await.add(job).await?;
        tracing::info!(job_id = %job_id, cron = %cron_expression, "Job scheduled");
        Ok(())
    }

    pub async fn init_schedules(&self) -> anyhow::Result<()> {
        let db = self.state.db.clone();
        let jobs = tokio::task::spawn_blocking(move || {
            let conn = db.get()?;
            backup_job::find_all(&conn)
        })
        .await??;

        let mut count = 0;
        for job in jobs {
            if let Some(cron) = &job.schedule_cron {
                if job.enabled != 0 && !cron.is_empty() {
                    if let Err(e) = self.schedule_job(&job.id, cron).await {
                        tracing::error!(job_id = %job.id, cron = %cron, error = %e, "Failed to schedule job");
                    } else {
                        count += 1;
                    }
                }
            }
        }

        tracing::info!(count, "Cron schedules initialized");
        Ok(())
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        Ok(())
    }
}

/// One scheduler tick: re-load the definition (it may have been edited or
/// disabled since scheduling), run the backup, stamp the run, apply
/// retention.
async fn run_scheduled(state: Arc<AppState>, job_id: String) {
    let db = state.db.clone();
    let jid = job_id.clone();
    let job = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        backup_job::find_by_id(&conn, &jid)
    })
    .await
    .ok()
    .and_then(|r| r.ok())
    .flatten();

    let Some(job) = job else { return };
    if job.enabled == 0 {
        return;
    }

    if state.job_gate.available_permits() == 0 {
        tracing::warn!(job_id = %job.id, "Skipping scheduled run: another job is active");
        return;
    }

    tracing::info!(job_id = %job.id, name = %job.name, "Starting scheduled backup");
    let config = job.to_config();
    if let Err(e) =
        backup_service::create_backup_for_job(state.clone(), config, Some(job.id.clone()), "scheduler")
            .await
    {
        tracing::error!(job_id = %job.id, error = %e, "Scheduled backup failed");
        return;
    }

    let db = state.db.clone();
    let result = tokio::task::spawn_blocking(move || {
        let conn = db.get()?;
        backup_job::touch_last_run(&conn, &job.id)?;
        retention::apply_retention(&conn, &job)
    })
    .await;

    match result {
        Ok(Ok(removed)) if removed > 0 => {
            tracing::info!(job_id = %job_id, removed, "Retention sweep removed expired backups")
        }
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!(job_id = %job_id, error = %e, "Retention sweep failed"),
        Err(e) => tracing::warn!(job_id = %job_id, error = %e, "Retention task panicked"),
    }
}
