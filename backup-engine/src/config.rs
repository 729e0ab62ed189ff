use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    /// Directory holding the canonical store files (`<store>.db`).
    pub stores_dir: PathBuf,
    /// File-tree roots captured when a job requests `include_files`.
    pub file_roots: Vec<PathBuf>,
    /// Where finished archives land.
    pub backups_dir: PathBuf,
    /// Job-scoped staging directories are created under here.
    pub staging_dir: PathBuf,
    /// A `running` record older than this is considered interrupted.
    pub stale_job_grace_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()));
        let backups_dir = std::env::var("BACKUPS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("backups"));

        let file_roots = match std::env::var("FILE_ROOTS") {
            Ok(v) => v.split(':').filter(|s| !s.is_empty()).map(PathBuf::from).collect(),
            Err(_) => vec![
                data_dir.join("uploads"),
                data_dir.join("logs"),
                data_dir.join("config"),
            ],
        };

        Self {
            db_path: data_dir.join("backup-engine.db"),
            stores_dir: std::env::var("STORES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("stores")),
            file_roots,
            staging_dir: backups_dir.join("staging"),
            backups_dir,
            stale_job_grace_secs: std::env::var("STALE_JOB_GRACE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(86400),
            data_dir,
        }
    }
}
