use crate::config::AppConfig;
use crate::db::connection::DbPool;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    /// One permit: a single active backup/restore job per deployment.
    pub job_gate: Arc<Semaphore>,
    /// Advisory locks on canonical store paths, keyed by store identifier.
    store_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        Self {
            db,
            config,
            job_gate: Arc::new(Semaphore::new(1)),
            store_locks: DashMap::new(),
        }
    }

    pub fn store_lock(&self, store_id: &str) -> Arc<Mutex<()>> {
        self.store_locks
            .entry(store_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
