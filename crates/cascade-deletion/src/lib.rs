//! Cascade Deletion (C9, spec §4.9): removes an Execution and everything
//! that depends on it — Analysis rows, then their artifact files, then the
//! Execution row itself — with an impact-analysis preview, an optional
//! timestamped backup, and a RUNNING-execution guard that skips rather than
//! aborts.
//!
//! Grounded directly on `original_source/cascade_deletion_system.py`
//! (`analyze_deletion_impact`, backup-then-delete ordering, per-file error
//! tolerance), translated from Python's best-effort `try/except` blocks to
//! `Result` propagation with a `Vec<String>` of accumulated per-file errors.

use analysis_core::AnalysisError;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub dry_run: bool,
    pub delete_files: bool,
    pub skip_backup: bool,
}

/// Preview of what a `delete` call would touch (§4.9 step 1).
#[derive(Debug, Clone, Default)]
pub struct ImpactAnalysis {
    pub found_execution_ids: Vec<String>,
    pub missing_execution_ids: Vec<String>,
    pub running_execution_ids: Vec<String>,
    pub analyses_affected: i64,
    pub by_symbol: HashMap<String, i64>,
    pub by_config: HashMap<String, i64>,
    pub chart_files: Vec<String>,
    pub compressed_files: Vec<String>,
    pub total_size_bytes: u64,
}

/// Outcome of a `delete` call, real or dry-run (§4.9 step 6).
#[derive(Debug, Clone, Default)]
pub struct DeletionReport {
    pub execution_logs_deleted: u64,
    pub analyses_deleted: u64,
    pub files_deleted: u64,
    pub files_size_freed: u64,
    pub skipped_running: Vec<String>,
    pub backup_dir: Option<PathBuf>,
    pub errors: Vec<String>,
}

struct AnalysisArtifact {
    chart_path: Option<String>,
    compressed_path: Option<String>,
}

/// Removes one or more Executions and their dependent Analysis rows.
///
/// `execution_pool`/`analysis_pool` may be the same pool (the unified
/// single-database deployment this workspace defaults to) or two distinct
/// pools (the source's original two-file layout) — see the Open Question
/// decision in `DESIGN.md`.
pub struct CascadeDeletion {
    execution_pool: SqlitePool,
    analysis_pool: SqlitePool,
    execution_db_path: Option<PathBuf>,
    analysis_db_path: Option<PathBuf>,
    backup_root: PathBuf,
}

impl CascadeDeletion {
    pub fn new(
        execution_pool: SqlitePool,
        analysis_pool: SqlitePool,
        execution_db_path: Option<PathBuf>,
        analysis_db_path: Option<PathBuf>,
        backup_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            execution_pool,
            analysis_pool,
            execution_db_path,
            analysis_db_path,
            backup_root: backup_root.into(),
        }
    }

    /// Step 1: join Execution x Analysis by `execution_id`, enumerate
    /// artifacts, and flag unknown / RUNNING ids. Never mutates anything.
    pub async fn analyze_impact(&self, execution_ids: &[String]) -> Result<ImpactAnalysis, AnalysisError> {
        let mut impact = ImpactAnalysis::default();
        if execution_ids.is_empty() {
            return Ok(impact);
        }

        let rows = self.fetch_execution_rows(execution_ids).await?;
        impact.found_execution_ids = rows.iter().map(|(id, _)| id.clone()).collect();
        impact.running_execution_ids =
            rows.iter().filter(|(_, status)| status == "RUNNING").map(|(id, _)| id.clone()).collect();
        impact.missing_execution_ids = execution_ids
            .iter()
            .filter(|id| !impact.found_execution_ids.contains(id))
            .cloned()
            .collect();

        if impact.found_execution_ids.is_empty() {
            return Ok(impact);
        }

        let artifacts = self.fetch_analyses(&impact.found_execution_ids).await?;
        impact.analyses_affected = artifacts.len() as i64;

        for artifact in &artifacts {
            if let Some(path) = &artifact.chart_path {
                if let Ok(metadata) = tokio::fs::metadata(path).await {
                    impact.chart_files.push(path.clone());
                    impact.total_size_bytes += metadata.len();
                }
            }
            if let Some(path) = &artifact.compressed_path {
                if let Ok(metadata) = tokio::fs::metadata(path).await {
                    impact.compressed_files.push(path.clone());
                    impact.total_size_bytes += metadata.len();
                }
            }
        }

        let (by_symbol, by_config) = self.group_counts(&impact.found_execution_ids).await?;
        impact.by_symbol = by_symbol;
        impact.by_config = by_config;

        Ok(impact)
    }

    /// Steps 2-6: guard RUNNING executions out of the batch (skipped, not
    /// aborted — the rest of the batch still proceeds), optionally back up,
    /// delete in dependency order, and vacuum. An empty `execution_ids` is a
    /// no-op (§8).
    pub async fn delete(
        &self,
        execution_ids: &[String],
        opts: DeleteOptions,
    ) -> Result<DeletionReport, AnalysisError> {
        if execution_ids.is_empty() {
            return Ok(DeletionReport::default());
        }

        let rows = self.fetch_execution_rows(execution_ids).await?;
        let running_ids: Vec<String> =
            rows.iter().filter(|(_, status)| status == "RUNNING").map(|(id, _)| id.clone()).collect();
        let deletable_ids: Vec<String> = rows
            .iter()
            .map(|(id, _)| id.clone())
            .filter(|id| !running_ids.contains(id))
            .collect();

        let mut report = DeletionReport { skipped_running: running_ids, ..Default::default() };
        if !report.skipped_running.is_empty() {
            tracing::warn!(
                "refusing to delete running execution(s): {}",
                report.skipped_running.join(", ")
            );
        }

        if deletable_ids.is_empty() {
            return Ok(report);
        }

        let artifacts = self.fetch_analyses(&deletable_ids).await?;

        if !opts.skip_backup && !opts.dry_run {
            match self.backup(&deletable_ids).await {
                Ok(dir) => report.backup_dir = Some(dir),
                Err(e) => report.errors.push(format!("backup failed: {e}")),
            }
        }

        if opts.dry_run {
            report.analyses_deleted = artifacts.len() as u64;
            report.execution_logs_deleted = deletable_ids.len() as u64;
            if opts.delete_files {
                let (count, size) = forecast_file_sizes(&artifacts).await;
                report.files_deleted = count;
                report.files_size_freed = size;
            }
            return Ok(report);
        }

        // Step 4a: analysis rows.
        match self.delete_analyses(&deletable_ids).await {
            Ok(n) => report.analyses_deleted = n,
            Err(e) => {
                report.errors.push(format!("analysis row deletion failed: {e}"));
                return Ok(report);
            }
        }

        // Step 4b: artifact files, continuing past individual failures.
        if opts.delete_files {
            let (deleted, freed, errors) = delete_files(&artifacts).await;
            report.files_deleted = deleted;
            report.files_size_freed = freed;
            report.errors.extend(errors);
        }

        // Step 4c: execution rows, only after (a) has run.
        match self.delete_executions(&deletable_ids).await {
            Ok(n) => report.execution_logs_deleted = n,
            Err(e) => report.errors.push(format!("execution log deletion failed: {e}")),
        }

        // Step 5: vacuum both pools. Harmless to run twice against the same
        // underlying file when the unified single-database deployment is in
        // use (execution_pool and analysis_pool are clones of one pool).
        if let Err(e) = sqlx::query("VACUUM").execute(&self.execution_pool).await {
            report.errors.push(format!("vacuum failed: {e}"));
        }
        if let Err(e) = sqlx::query("VACUUM").execute(&self.analysis_pool).await {
            report.errors.push(format!("vacuum (analysis db) failed: {e}"));
        }

        Ok(report)
    }

    async fn fetch_execution_rows(
        &self,
        execution_ids: &[String],
    ) -> Result<Vec<(String, String)>, AnalysisError> {
        let placeholders = execution_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT execution_id, status FROM execution_logs WHERE execution_id IN ({placeholders})"
        );
        let mut q = sqlx::query(&query);
        for id in execution_ids {
            q = q.bind(id);
        }
        let rows = q.fetch_all(&self.execution_pool).await.map_err(sqlx_err)?;
        rows.into_iter()
            .map(|row| {
                let id: String = row.try_get("execution_id").map_err(sqlx_err)?;
                let status: String = row.try_get("status").map_err(sqlx_err)?;
                Ok((id, status))
            })
            .collect()
    }

    async fn fetch_analyses(&self, execution_ids: &[String]) -> Result<Vec<AnalysisArtifact>, AnalysisError> {
        let placeholders = execution_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query =
            format!("SELECT chart_path, compressed_path FROM analyses WHERE execution_id IN ({placeholders})");
        let mut q = sqlx::query(&query);
        for id in execution_ids {
            q = q.bind(id);
        }
        let rows = q.fetch_all(&self.analysis_pool).await.map_err(sqlx_err)?;
        rows.into_iter()
            .map(|row| {
                Ok(AnalysisArtifact {
                    chart_path: row.try_get("chart_path").map_err(sqlx_err)?,
                    compressed_path: row.try_get("compressed_path").map_err(sqlx_err)?,
                })
            })
            .collect()
    }

    async fn group_counts(
        &self,
        execution_ids: &[String],
    ) -> Result<(HashMap<String, i64>, HashMap<String, i64>), AnalysisError> {
        let placeholders = execution_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!("SELECT symbol, config FROM analyses WHERE execution_id IN ({placeholders})");
        let mut q = sqlx::query(&query);
        for id in execution_ids {
            q = q.bind(id);
        }
        let rows = q.fetch_all(&self.analysis_pool).await.map_err(sqlx_err)?;

        let mut by_symbol = HashMap::new();
        let mut by_config = HashMap::new();
        for row in rows {
            let symbol: String = row.try_get("symbol").map_err(sqlx_err)?;
            let config: String = row.try_get("config").map_err(sqlx_err)?;
            *by_symbol.entry(symbol).or_insert(0) += 1;
            *by_config.entry(config).or_insert(0) += 1;
        }
        Ok((by_symbol, by_config))
    }

    async fn delete_analyses(&self, execution_ids: &[String]) -> Result<u64, AnalysisError> {
        let placeholders = execution_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!("DELETE FROM analyses WHERE execution_id IN ({placeholders})");
        let mut q = sqlx::query(&query);
        for id in execution_ids {
            q = q.bind(id);
        }
        let result = q.execute(&self.analysis_pool).await.map_err(sqlx_err)?;
        Ok(result.rows_affected())
    }

    async fn delete_executions(&self, execution_ids: &[String]) -> Result<u64, AnalysisError> {
        let placeholders = execution_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!("DELETE FROM execution_logs WHERE execution_id IN ({placeholders})");
        let mut q = sqlx::query(&query);
        for id in execution_ids {
            q = q.bind(id);
        }
        let result = q.execute(&self.execution_pool).await.map_err(sqlx_err)?;
        Ok(result.rows_affected())
    }

    /// Step 3: copy the backing database file(s) to a timestamped directory
    /// plus a JSON manifest. A no-op per file whose path wasn't configured
    /// (e.g. an in-memory pool in tests).
    async fn backup(&self, execution_ids: &[String]) -> Result<PathBuf, AnalysisError> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let backup_dir = self.backup_root.join(format!("cascade_deletion_{timestamp}"));
        tokio::fs::create_dir_all(&backup_dir)
            .await
            .map_err(|e| AnalysisError::Unknown(format!("failed to create backup dir: {e}")))?;

        let mut backups = HashMap::new();
        if let Some(path) = &self.execution_db_path {
            let dest = backup_dir.join("execution_logs_backup.db");
            tokio::fs::copy(path, &dest)
                .await
                .map_err(|e| AnalysisError::Unknown(format!("failed to back up execution log db: {e}")))?;
            backups.insert("execution".to_string(), dest.display().to_string());
        }
        if let Some(path) = &self.analysis_db_path {
            let dest = backup_dir.join("analysis_backup.db");
            tokio::fs::copy(path, &dest)
                .await
                .map_err(|e| AnalysisError::Unknown(format!("failed to back up analysis db: {e}")))?;
            backups.insert("analysis".to_string(), dest.display().to_string());
        }

        let manifest = serde_json::json!({
            "timestamp": timestamp,
            "backup_dir": backup_dir.display().to_string(),
            "backups": backups,
            "target_execution_ids": execution_ids,
        });
        let manifest_path = backup_dir.join("backup_info.json");
        let manifest_str = serde_json::to_string_pretty(&manifest)
            .map_err(|e| AnalysisError::Unknown(format!("failed to serialize backup manifest: {e}")))?;
        tokio::fs::write(&manifest_path, manifest_str)
            .await
            .map_err(|e| AnalysisError::Unknown(format!("failed to write backup manifest: {e}")))?;

        Ok(backup_dir)
    }
}

async fn forecast_file_sizes(artifacts: &[AnalysisArtifact]) -> (u64, u64) {
    let mut count = 0u64;
    let mut size = 0u64;
    for path in artifact_paths(artifacts) {
        if let Ok(metadata) = tokio::fs::metadata(&path).await {
            count += 1;
            size += metadata.len();
        }
    }
    (count, size)
}

/// Deletes each artifact file, recording but not propagating per-file
/// errors — a missing or unremovable chart shouldn't block the rest of the
/// batch (§4.9 step 4).
async fn delete_files(artifacts: &[AnalysisArtifact]) -> (u64, u64, Vec<String>) {
    let mut deleted = 0u64;
    let mut freed = 0u64;
    let mut errors = Vec::new();

    for path in artifact_paths(artifacts) {
        match tokio::fs::metadata(&path).await {
            Ok(metadata) => {
                let size = metadata.len();
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {
                        deleted += 1;
                        freed += size;
                    }
                    Err(e) => errors.push(format!("failed to delete {path}: {e}")),
                }
            }
            Err(_) => continue,
        }
    }

    (deleted, freed, errors)
}

fn artifact_paths(artifacts: &[AnalysisArtifact]) -> Vec<String> {
    artifacts
        .iter()
        .flat_map(|a| a.chart_path.iter().chain(a.compressed_path.iter()))
        .cloned()
        .collect()
}

fn sqlx_err(e: sqlx::Error) -> AnalysisError {
    AnalysisError::DatabaseError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePool;

    async fn seeded(pool: &SqlitePool) {
        for statement in include_str!("../../execution-log-store/schema.sql").split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(pool).await.unwrap();
            }
        }
        for statement in include_str!("../../analysis-store/schema.sql").split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(pool).await.unwrap();
            }
        }
    }

    async fn insert_execution(pool: &SqlitePool, id: &str, symbol: &str, status: &str) {
        sqlx::query(
            "INSERT INTO execution_logs (execution_id, execution_type, symbol, timestamp_start, status, errors)
             VALUES (?, 'SYMBOL_ADDITION', ?, ?, ?, '[]')",
        )
        .bind(id)
        .bind(symbol)
        .bind(Utc::now().to_rfc3339())
        .bind(status)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn insert_analysis(pool: &SqlitePool, execution_id: &str, symbol: &str) {
        sqlx::query(
            "INSERT INTO analyses (execution_id, symbol, timeframe, config, task_status)
             VALUES (?, ?, '1h', 'momentum', 'completed')",
        )
        .bind(execution_id)
        .bind(symbol)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn cascade() -> (CascadeDeletion, tempfile::TempDir) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        seeded(&pool).await;
        let dir = tempfile::tempdir().unwrap();
        (CascadeDeletion::new(pool.clone(), pool, None, None, dir.path()), dir)
    }

    #[tokio::test]
    async fn empty_id_list_is_a_no_op() {
        let (cascade, _dir) = cascade().await;
        let report = cascade.delete(&[], DeleteOptions::default()).await.unwrap();
        assert_eq!(report.execution_logs_deleted, 0);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn refuses_to_delete_a_running_execution_but_still_deletes_the_rest() {
        let (cascade, _dir) = cascade().await;
        insert_execution(&cascade.execution_pool, "e1", "BTC", "RUNNING").await;
        insert_execution(&cascade.execution_pool, "e2", "ETH", "SUCCESS").await;
        for _ in 0..7 {
            insert_analysis(&cascade.analysis_pool, "e2", "ETH").await;
        }
        insert_analysis(&cascade.analysis_pool, "e1", "BTC").await;

        let report = cascade
            .delete(&["e1".to_string(), "e2".to_string()], DeleteOptions { skip_backup: true, ..Default::default() })
            .await
            .unwrap();

        assert_eq!(report.skipped_running, vec!["e1".to_string()]);
        assert_eq!(report.analyses_deleted, 7);
        assert_eq!(report.execution_logs_deleted, 1);

        let remaining = cascade.fetch_execution_rows(&["e1".to_string()]).await.unwrap();
        assert_eq!(remaining.len(), 1, "the running execution must survive untouched");

        let remaining_analyses = cascade.fetch_analyses(&["e1".to_string()]).await.unwrap();
        assert_eq!(remaining_analyses.len(), 1, "e1's analysis row must survive untouched");
    }

    #[tokio::test]
    async fn dry_run_reports_the_same_numbers_without_mutating_anything() {
        let (cascade, _dir) = cascade().await;
        insert_execution(&cascade.execution_pool, "e3", "SOL", "SUCCESS").await;
        insert_analysis(&cascade.analysis_pool, "e3", "SOL").await;
        insert_analysis(&cascade.analysis_pool, "e3", "SOL").await;

        let report = cascade
            .delete(&["e3".to_string()], DeleteOptions { dry_run: true, ..Default::default() })
            .await
            .unwrap();

        assert_eq!(report.analyses_deleted, 2);
        assert_eq!(report.execution_logs_deleted, 1);
        assert!(cascade.fetch_execution_rows(&["e3".to_string()]).await.unwrap().len() == 1);
        assert_eq!(cascade.fetch_analyses(&["e3".to_string()]).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_execution_ids_are_reported_by_impact_analysis() {
        let (cascade, _dir) = cascade().await;
        insert_execution(&cascade.execution_pool, "known", "BTC", "SUCCESS").await;

        let impact = cascade
            .analyze_impact(&["known".to_string(), "ghost".to_string()])
            .await
            .unwrap();

        assert_eq!(impact.found_execution_ids, vec!["known".to_string()]);
        assert_eq!(impact.missing_execution_ids, vec!["ghost".to_string()]);
    }

    #[tokio::test]
    async fn delete_is_idempotent_on_an_already_deleted_execution() {
        let (cascade, _dir) = cascade().await;
        insert_execution(&cascade.execution_pool, "e4", "BTC", "SUCCESS").await;
        insert_analysis(&cascade.analysis_pool, "e4", "BTC").await;

        let first = cascade
            .delete(&["e4".to_string()], DeleteOptions { skip_backup: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(first.execution_logs_deleted, 1);

        let second = cascade
            .delete(&["e4".to_string()], DeleteOptions { skip_backup: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(second.execution_logs_deleted, 0);
        assert!(second.errors.is_empty());
    }
}
