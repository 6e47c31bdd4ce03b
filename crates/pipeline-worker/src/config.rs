use anyhow::Result;
use std::env;

/// Worker process configuration (§5/§6), read from the environment the way
/// `trading-agent::AgentConfig::from_env` does: every key has a sane
/// default, parse failures surface as a startup error instead of a silent
/// fallback.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Path to the single SQLite file backing both the Execution Log and
    /// Analysis stores (the unified-deployment mode, §9 Open Questions).
    pub database_path: String,
    /// Root directory for the Progress Store's `progress/`, `locks/`, and
    /// `index/` layout (§4.1).
    pub progress_root: String,
    /// Root directory cascade deletion writes its timestamped backups under
    /// (§4.9).
    pub backup_root: String,
    /// Worker-pool semaphore size `P` (§5); defaults to `min(#CPU, 4)`.
    pub worker_pool_size: usize,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        let default_pool_size = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(4);

        let config = Self {
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "pipeline.db".to_string()),
            progress_root: env::var("PROGRESS_STORE_ROOT").unwrap_or_else(|_| "./progress".to_string()),
            backup_root: env::var("CASCADE_BACKUP_ROOT").unwrap_or_else(|_| "./backups".to_string()),
            worker_pool_size: env::var("WORKER_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default_pool_size)
                .max(1),
        };

        Ok(config)
    }
}
