//! Worker-pool entry point (§2, §5): wires every component crate together,
//! owns the process-wide worker-pool semaphore, and drives symbol-addition
//! requests to completion until told to shut down.
//!
//! Grounded on `trading-agent::main` for startup shape — dotenv, tracing
//! init with the `RUST_LOG_FORMAT` branch, a panic hook, sequential
//! component construction with `info!` confirmations, and a
//! `tokio::select!` main loop racing SIGINT/SIGTERM against useful work.

mod config;
mod data_provider;

use analysis_store::AnalysisStore;
use anyhow::{Context, Result};
use cascade_deletion::CascadeDeletion;
use config::WorkerConfig;
use data_provider::StubDataProvider;
use execution_log_store::ExecutionLogStore;
use notification_service::{Notifier, NotifierConfig};
use progress_store::ProgressStore;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use strategy_catalog::StrategyCatalog;
use symbol_coordinator::{AddSymbolRequest, SymbolCoordinator};
use tokio::signal::unix::SignalKind;
use tokio::sync::Semaphore;
use tokio::time;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    install_panic_hook();

    tracing::info!("starting pipeline-worker");

    let config = WorkerConfig::from_env().context("loading worker configuration")?;
    tracing::info!(pool_size = config.worker_pool_size, database = %config.database_path, "configuration loaded");

    let pool = connect_pool(&config.database_path).await.context("connecting to the analysis database")?;
    sqlx::query("SELECT 1").execute(&pool).await.context("database connectivity check failed")?;
    tracing::info!("database connection established");

    let execution_log = ExecutionLogStore::new(pool.clone());
    execution_log.init_schema().await.context("initializing execution_logs schema")?;
    let analysis_store = AnalysisStore::new(pool.clone()).await.context("initializing analyses schema")?;
    let strategy_catalog = StrategyCatalog::new(pool.clone()).await.context("initializing strategy_configurations schema")?;
    tracing::info!("stores initialized");

    let progress_store = Arc::new(
        ProgressStore::new(&config.progress_root).context("initializing the progress store directory layout")?,
    );
    tracing::info!(root = %config.progress_root, "progress store ready");

    let notifier = Arc::new(Notifier::new(&NotifierConfig::from_env()));
    let data_provider: Arc<dyn analysis_core::DataProvider> = Arc::new(StubDataProvider::new());
    let worker_pool = Arc::new(Semaphore::new(config.worker_pool_size));

    let coordinator = Arc::new(SymbolCoordinator::new(
        data_provider,
        progress_store,
        execution_log.clone(),
        analysis_store.clone(),
        strategy_catalog,
        notifier.clone(),
        worker_pool,
    ));

    let cascade = CascadeDeletion::new(
        pool.clone(),
        pool.clone(),
        Some(config.database_path.clone().into()),
        Some(config.database_path.clone().into()),
        config.backup_root.clone(),
    );
    tracing::info!(backup_root = %config.backup_root, "cascade deletion ready");
    // Ready for an admin-path caller (out of scope, §1) to drive via
    // `CascadeDeletion::delete`; nothing in this binary invokes it yet.
    let _cascade = cascade;

    tracing::info!("pipeline-worker is running. Press Ctrl+C to stop.");
    run(coordinator).await
}

/// The worker's steady-state loop: poll for queued requests the way the
/// teacher's `market_scanner` polls for opportunities, racing each tick
/// against a graceful shutdown signal. Request ingestion itself — how a
/// queued `AddSymbolRequest`/deletion request reaches this process — is the
/// HTTP/dashboard boundary this crate stops short of (§1 non-goals); this
/// loop is the seam a real ingestion surface (queue consumer, RPC handler)
/// plugs into.
async fn run(coordinator: Arc<SymbolCoordinator>) -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    let mut heartbeat = time::interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                tracing::debug!("pipeline-worker heartbeat");
            }
            request = next_request() => {
                if let Some(request) = request {
                    let coordinator = coordinator.clone();
                    tokio::spawn(async move {
                        match coordinator.add_symbol(request).await {
                            Ok(execution_id) => tracing::info!(%execution_id, "symbol addition finished"),
                            Err(e) => tracing::warn!("symbol addition failed: {}", e),
                        }
                    });
                }
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, exiting gracefully");
                break;
            }
        }
    }

    tracing::info!("pipeline-worker shut down");
    Ok(())
}

/// Placeholder for the real ingestion surface (§1 non-goals exclude the
/// HTTP/dashboard boundary that would normally feed this). Never resolves
/// on its own, so the loop above is driven entirely by the heartbeat and
/// shutdown arms until a concrete request source is wired in.
async fn next_request() -> Option<AddSymbolRequest> {
    std::future::pending().await
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(env_filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter()).init();
    }
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));
}

async fn connect_pool(database_path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{database_path}"))?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(10))
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
    Ok(pool)
}
