use backup_engine::config::AppConfig;
use backup_engine::db::connection::create_pool;
use backup_engine::db::migrate::migrate;
use backup_engine::services::backup_scheduler::BackupScheduler;
use backup_engine::services::db_backup::snapshot_metadata_db;
use backup_engine::services::job_sweep::reconcile_interrupted;
use backup_engine::state::AppState;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!("Starting backup engine");

    // Ensure data directories exist
    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(&config.stores_dir)?;
    std::fs::create_dir_all(&config.backups_dir)?;
    std::fs::create_dir_all(&config.staging_dir)?;

    // Initialize database
    let db_path = config.db_path.to_string_lossy().to_string();
    let pool = create_pool(&db_path);
    migrate(&pool)?;

    // Daily metadata database snapshot
    if let Err(e) = snapshot_metadata_db(&config.db_path, &config.data_dir) {
        tracing::warn!("Failed to snapshot metadata database: {}", e);
    }

    // A crash leaves records stranded in running; reconcile them first.
    let grace = config.stale_job_grace_secs;
    if let Err(e) = reconcile_interrupted(&pool, grace) {
        tracing::warn!("Interrupted-job reconciliation failed: {}", e);
    }

    // Build application state
    let state = Arc::new(AppState::new(pool, config));

    // Initialize cron scheduler
    let scheduler = match BackupScheduler::new(state.clone()).await {
        Ok(s) => {
            if let Err(e) = s.init_schedules().await {
                tracing::warn!("Failed to initialize schedules: {}", e);
            }
            if let Err(e) = s.start().await {
                tracing::warn!("Failed to start scheduler: {}", e);
            }
            Some(s)
        }
        Err(e) => {
            tracing::warn!("Failed to create scheduler: {}", e);
            None
        }
    };

    shutdown_signal().await;

    // Cleanup
    tracing::info!("Shutting down...");
    if let Some(s) = scheduler {
        if let Err(e) = s.shutdown().await {
            tracing::warn!("Scheduler shutdown error: {}", e);
        }
    }

    backup_engine::db::connection::close_pool(&state.db);
    tracing::info!("Engine stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
