//! Analysis Store (C3, spec §4.3) — one row per (execution × symbol ×
//! timeframe × strategy-config) task.

pub mod models;

pub use models::*;

use analysis_core::AnalysisError;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

#[derive(Clone)]
pub struct AnalysisStore {
    pool: SqlitePool,
}

impl AnalysisStore {
    /// Open the store and create its table if missing. Does not itself
    /// validate referential integrity against `execution_logs` — call
    /// `check_orphans` once at startup when the two stores live in separate
    /// database files (§4.2/§4.3, "or (b)").
    pub async fn new(pool: SqlitePool) -> Result<Self, AnalysisError> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), AnalysisError> {
        let schema = include_str!("../schema.sql");
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await.map_err(sqlx_err)?;
            }
        }
        Ok(())
    }

    pub async fn insert_pending_task(&self, task: NewTask) -> Result<i64, AnalysisError> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query(
            "INSERT INTO analyses (
                execution_id, symbol, timeframe, config, strategy_config_id,
                strategy_name, task_status, task_created_at
            ) VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)
            RETURNING id",
        )
        .bind(&task.execution_id)
        .bind(&task.symbol)
        .bind(&task.timeframe)
        .bind(&task.config)
        .bind(task.strategy_config_id)
        .bind(&task.strategy_name)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_err)?;

        row.try_get::<i64, _>("id").map_err(sqlx_err)
    }

    pub async fn mark_task_running(&self, task_id: i64) -> Result<(), AnalysisError> {
        sqlx::query("UPDATE analyses SET task_status = 'running', task_started_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        Ok(())
    }

    pub async fn mark_task_completed(
        &self,
        task_id: i64,
        results: TaskResults,
    ) -> Result<(), AnalysisError> {
        sqlx::query(
            "UPDATE analyses SET
                task_status = 'completed',
                task_completed_at = ?,
                total_trades = ?, win_rate = ?, total_return = ?,
                sharpe_ratio = ?, max_drawdown = ?, avg_leverage = ?,
                chart_path = ?, compressed_path = ?
             WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(results.total_trades)
        .bind(results.win_rate)
        .bind(results.total_return)
        .bind(results.sharpe_ratio)
        .bind(results.max_drawdown)
        .bind(results.avg_leverage)
        .bind(results.chart_path)
        .bind(results.compressed_path)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(())
    }

    pub async fn mark_task_failed(&self, task_id: i64, error_message: &str) -> Result<(), AnalysisError> {
        sqlx::query(
            "UPDATE analyses SET task_status = 'failed', task_completed_at = ?, error_message = ?
             WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(truncate_error_message(error_message))
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(())
    }

    /// Bulk-fail every still-`pending` task for `(execution_id, symbol)` in
    /// one statement — idempotent under retry because it only ever touches
    /// rows still in `pending` (§4.2).
    pub async fn mark_task_failed_by_execution(
        &self,
        execution_id: &str,
        symbol: &str,
        error_message: &str,
    ) -> Result<u64, AnalysisError> {
        let result = sqlx::query(
            "UPDATE analyses SET task_status = 'failed', task_completed_at = ?, error_message = ?
             WHERE execution_id = ? AND symbol = ? AND task_status = 'pending'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(truncate_error_message(error_message))
        .bind(execution_id)
        .bind(symbol)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;

        Ok(result.rows_affected())
    }

    pub async fn count_by_status(&self, execution_id: &str) -> Result<StatusCounts, AnalysisError> {
        let rows = sqlx::query("SELECT task_status, COUNT(*) as n FROM analyses WHERE execution_id = ? GROUP BY task_status")
            .bind(execution_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status: String = row.try_get("task_status").map_err(sqlx_err)?;
            let n: i64 = row.try_get("n").map_err(sqlx_err)?;
            match TaskStatus::parse(&status) {
                Some(TaskStatus::Pending) => counts.pending = n,
                Some(TaskStatus::Running) => counts.running = n,
                Some(TaskStatus::Completed) => counts.completed = n,
                Some(TaskStatus::Failed) => counts.failed = n,
                None => tracing::warn!("unknown task_status {} for execution {}", status, execution_id),
            }
        }
        Ok(counts)
    }

    pub async fn fetch_tasks(&self, execution_id: &str) -> Result<Vec<AnalysisTask>, AnalysisError> {
        let rows = sqlx::query(
            "SELECT id, execution_id, symbol, timeframe, config, strategy_config_id, strategy_name,
                    task_status, task_created_at, task_started_at, task_completed_at,
                    error_message, retry_count, total_trades, win_rate, total_return,
                    sharpe_ratio, max_drawdown, avg_leverage, chart_path, compressed_path
             FROM analyses WHERE execution_id = ? ORDER BY id",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_err)?;

        rows.into_iter().map(row_to_task).collect()
    }

    /// Returns the ids of rows whose `execution_id` is not present in
    /// `known_execution_ids`. The caller rejects (logs + refuses startup,
    /// or hands them to Cascade Deletion) when the two stores are deployed
    /// as separate database files and native foreign keys aren't available.
    pub async fn check_orphans(
        &self,
        known_execution_ids: &[String],
    ) -> Result<Vec<i64>, AnalysisError> {
        let rows = sqlx::query("SELECT DISTINCT id, execution_id FROM analyses")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;

        let mut orphans = Vec::new();
        for row in rows {
            let execution_id: String = row.try_get("execution_id").map_err(sqlx_err)?;
            if !known_execution_ids.iter().any(|id| id == &execution_id) {
                let id: i64 = row.try_get("id").map_err(sqlx_err)?;
                tracing::warn!("orphaned analysis row {} references missing execution {}", id, execution_id);
                orphans.push(id);
            }
        }
        Ok(orphans)
    }
}

fn row_to_task(row: sqlx::sqlite::SqliteRow) -> Result<AnalysisTask, AnalysisError> {
    let status_raw: String = row.try_get("task_status").map_err(sqlx_err)?;
    let task_status = TaskStatus::parse(&status_raw)
        .ok_or_else(|| AnalysisError::InvalidData(format!("unknown task status {status_raw}")))?;

    Ok(AnalysisTask {
        id: row.try_get("id").map_err(sqlx_err)?,
        execution_id: row.try_get("execution_id").map_err(sqlx_err)?,
        symbol: row.try_get("symbol").map_err(sqlx_err)?,
        timeframe: row.try_get("timeframe").map_err(sqlx_err)?,
        config: row.try_get("config").map_err(sqlx_err)?,
        strategy_config_id: row.try_get("strategy_config_id").map_err(sqlx_err)?,
        strategy_name: row.try_get("strategy_name").map_err(sqlx_err)?,
        task_status,
        task_created_at: row.try_get("task_created_at").map_err(sqlx_err)?,
        task_started_at: row.try_get("task_started_at").map_err(sqlx_err)?,
        task_completed_at: row.try_get("task_completed_at").map_err(sqlx_err)?,
        error_message: row.try_get("error_message").map_err(sqlx_err)?,
        retry_count: row.try_get("retry_count").map_err(sqlx_err)?,
        total_trades: row.try_get("total_trades").map_err(sqlx_err)?,
        win_rate: row.try_get("win_rate").map_err(sqlx_err)?,
        total_return: row.try_get("total_return").map_err(sqlx_err)?,
        sharpe_ratio: row.try_get("sharpe_ratio").map_err(sqlx_err)?,
        max_drawdown: row.try_get("max_drawdown").map_err(sqlx_err)?,
        avg_leverage: row.try_get("avg_leverage").map_err(sqlx_err)?,
        chart_path: row.try_get("chart_path").map_err(sqlx_err)?,
        compressed_path: row.try_get("compressed_path").map_err(sqlx_err)?,
    })
}

fn sqlx_err(e: sqlx::Error) -> AnalysisError {
    AnalysisError::DatabaseError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> AnalysisStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        AnalysisStore::new(pool).await.unwrap()
    }

    fn task(execution_id: &str, symbol: &str) -> NewTask {
        NewTask {
            execution_id: execution_id.to_string(),
            symbol: symbol.to_string(),
            timeframe: "15m".to_string(),
            config: "momentum".to_string(),
            strategy_config_id: Some(1),
            strategy_name: Some("momentum-v1".to_string()),
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_round_trips() {
        let store = store().await;
        let id = store.insert_pending_task(task("exec-1", "BTC")).await.unwrap();

        let tasks = store.fetch_tasks("exec-1").await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, id);
        assert_eq!(tasks[0].task_status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn completion_populates_result_fields() {
        let store = store().await;
        let id = store.insert_pending_task(task("exec-2", "BTC")).await.unwrap();
        store.mark_task_running(id).await.unwrap();

        store
            .mark_task_completed(
                id,
                TaskResults {
                    total_trades: Some(10),
                    win_rate: Some(0.6),
                    total_return: Some(12.5),
                    sharpe_ratio: Some(1.8),
                    max_drawdown: Some(-4.2),
                    avg_leverage: Some(3.0),
                    chart_path: Some("/charts/exec-2.png".into()),
                    compressed_path: None,
                },
            )
            .await
            .unwrap();

        let tasks = store.fetch_tasks("exec-2").await.unwrap();
        assert_eq!(tasks[0].task_status, TaskStatus::Completed);
        assert_eq!(tasks[0].total_trades, Some(10));
        assert!(tasks[0].task_completed_at.is_some());
    }

    #[tokio::test]
    async fn failed_task_truncates_long_error_message() {
        let store = store().await;
        let id = store.insert_pending_task(task("exec-3", "BTC")).await.unwrap();
        let long_message = "x".repeat(ERROR_MESSAGE_MAX_LEN + 50);

        store.mark_task_failed(id, &long_message).await.unwrap();
        let tasks = store.fetch_tasks("exec-3").await.unwrap();
        assert_eq!(tasks[0].error_message.as_ref().unwrap().len(), ERROR_MESSAGE_MAX_LEN);
    }

    #[tokio::test]
    async fn mass_fail_by_execution_is_idempotent_and_scoped() {
        let store = store().await;
        store.insert_pending_task(task("exec-4", "BTC")).await.unwrap();
        store.insert_pending_task(task("exec-4", "BTC")).await.unwrap();
        let other = store.insert_pending_task(task("exec-4", "ETH")).await.unwrap();

        let affected = store
            .mark_task_failed_by_execution("exec-4", "BTC", "provider unreachable for BTC")
            .await
            .unwrap();
        assert_eq!(affected, 2);

        // idempotent: a second call touches nothing further
        let affected_again = store
            .mark_task_failed_by_execution("exec-4", "BTC", "provider unreachable for BTC")
            .await
            .unwrap();
        assert_eq!(affected_again, 0);

        let eth_task = store.fetch_tasks("exec-4").await.unwrap();
        let eth = eth_task.iter().find(|t| t.id == other).unwrap();
        assert_eq!(eth.task_status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn count_by_status_reflects_mixed_outcomes() {
        let store = store().await;
        let a = store.insert_pending_task(task("exec-5", "BTC")).await.unwrap();
        let b = store.insert_pending_task(task("exec-5", "BTC")).await.unwrap();
        store.insert_pending_task(task("exec-5", "BTC")).await.unwrap();

        store.mark_task_running(a).await.unwrap();
        store.mark_task_failed(b, "boom").await.unwrap();

        let counts = store.count_by_status("exec-5").await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.failed, 1);
        assert!(counts.has_unfinished());
    }

    #[tokio::test]
    async fn check_orphans_flags_unknown_execution_ids() {
        let store = store().await;
        store.insert_pending_task(task("exec-known", "BTC")).await.unwrap();
        let orphan_id = store.insert_pending_task(task("exec-gone", "ETH")).await.unwrap();

        let orphans = store
            .check_orphans(&["exec-known".to_string()])
            .await
            .unwrap();
        assert_eq!(orphans, vec![orphan_id]);
    }
}
