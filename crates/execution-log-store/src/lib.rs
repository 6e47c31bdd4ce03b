//! Execution Log Store (C2, spec §4.2) — the relational record of each
//! symbol-addition request's lifecycle.

pub mod models;

pub use models::*;

use analysis_core::AnalysisError;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use uuid::Uuid;

#[derive(Clone)]
pub struct ExecutionLogStore {
    pool: SqlitePool,
}

impl ExecutionLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `execution_logs` table if it doesn't exist yet.
    pub async fn init_schema(&self) -> Result<(), AnalysisError> {
        let schema = include_str!("../schema.sql");
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;
            }
        }
        Ok(())
    }

    pub async fn create_execution(&self, req: NewExecutionRequest) -> Result<String, AnalysisError> {
        let execution_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let strategy_ids_json = serde_json::to_string(&req.selected_strategy_ids)
            .map_err(|e| AnalysisError::InvalidData(e.to_string()))?;

        sqlx::query(
            "INSERT INTO execution_logs (
                execution_id, execution_type, symbol, timestamp_start, status,
                progress_percentage, selected_strategy_ids, execution_mode,
                estimated_patterns, errors
            ) VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, '[]')",
        )
        .bind(&execution_id)
        .bind(req.execution_type.as_str())
        .bind(&req.symbol)
        .bind(now.to_rfc3339())
        .bind(ExecutionStatus::Pending.as_str())
        .bind(strategy_ids_json)
        .bind(req.execution_mode.as_str())
        .bind(req.estimated_patterns)
        .execute(&self.pool)
        .await
        .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;

        Ok(execution_id)
    }

    pub async fn mark_running(&self, execution_id: &str) -> Result<(), AnalysisError> {
        self.set_status(execution_id, ExecutionStatus::Running).await
    }

    pub async fn mark_success(&self, execution_id: &str) -> Result<(), AnalysisError> {
        sqlx::query(
            "UPDATE execution_logs SET status = ?, timestamp_end = ?, progress_percentage = 100
             WHERE execution_id = ?",
        )
        .bind(ExecutionStatus::Success.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(execution_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    pub async fn mark_failed(&self, execution_id: &str, err: &str) -> Result<(), AnalysisError> {
        let existing = self.lookup(execution_id).await?;
        let mut errors = existing.map(|e| e.errors).unwrap_or_default();
        errors.push(err.to_string());
        let errors_json =
            serde_json::to_string(&errors).map_err(|e| AnalysisError::InvalidData(e.to_string()))?;

        sqlx::query(
            "UPDATE execution_logs SET status = ?, timestamp_end = ?, errors = ?
             WHERE execution_id = ?",
        )
        .bind(ExecutionStatus::Failed.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(errors_json)
        .bind(execution_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    pub async fn update_progress(
        &self,
        execution_id: &str,
        pct: f64,
        op: &str,
    ) -> Result<(), AnalysisError> {
        sqlx::query(
            "UPDATE execution_logs SET progress_percentage = ?, current_operation = ?
             WHERE execution_id = ?",
        )
        .bind(pct.clamp(0.0, 100.0))
        .bind(op)
        .bind(execution_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    pub async fn lookup(&self, execution_id: &str) -> Result<Option<Execution>, AnalysisError> {
        let row = sqlx::query(
            "SELECT execution_id, execution_type, symbol, status, timestamp_start, timestamp_end,
                    selected_strategy_ids, execution_mode, estimated_patterns,
                    progress_percentage, current_operation, errors
             FROM execution_logs WHERE execution_id = ?",
        )
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;

        row.map(row_to_execution).transpose()
    }

    pub async fn list_recent(&self, filter: RecentFilter) -> Result<Vec<Execution>, AnalysisError> {
        let limit = filter.limit.unwrap_or(50).clamp(1, 1000);
        let rows = if let Some(status) = filter.status {
            sqlx::query(
                "SELECT execution_id, execution_type, symbol, status, timestamp_start, timestamp_end,
                        selected_strategy_ids, execution_mode, estimated_patterns,
                        progress_percentage, current_operation, errors
                 FROM execution_logs WHERE status = ? ORDER BY timestamp_start DESC LIMIT ?",
            )
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                "SELECT execution_id, execution_type, symbol, status, timestamp_start, timestamp_end,
                        selected_strategy_ids, execution_mode, estimated_patterns,
                        progress_percentage, current_operation, errors
                 FROM execution_logs ORDER BY timestamp_start DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(row_to_execution).collect()
    }

    pub async fn list_for_symbol(&self, symbol: &str) -> Result<Vec<Execution>, AnalysisError> {
        let rows = sqlx::query(
            "SELECT execution_id, execution_type, symbol, status, timestamp_start, timestamp_end,
                    selected_strategy_ids, execution_mode, estimated_patterns,
                    progress_percentage, current_operation, errors
             FROM execution_logs WHERE symbol = ? ORDER BY timestamp_start DESC",
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;

        rows.into_iter().map(row_to_execution).collect()
    }

    async fn set_status(&self, execution_id: &str, status: ExecutionStatus) -> Result<(), AnalysisError> {
        sqlx::query("UPDATE execution_logs SET status = ? WHERE execution_id = ?")
            .bind(status.as_str())
            .bind(execution_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AnalysisError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

fn row_to_execution(row: sqlx::sqlite::SqliteRow) -> Result<Execution, AnalysisError> {
    let status_raw: String = row.try_get("status").map_err(sqlx_err)?;
    let status = ExecutionStatus::parse(&status_raw)
        .ok_or_else(|| AnalysisError::InvalidData(format!("unknown execution status {status_raw}")))?;

    let timestamp_start: String = row.try_get("timestamp_start").map_err(sqlx_err)?;
    let timestamp_start = chrono::DateTime::parse_from_rfc3339(&timestamp_start)
        .map_err(|e| AnalysisError::InvalidData(e.to_string()))?
        .with_timezone(&Utc);

    let timestamp_end: Option<String> = row.try_get("timestamp_end").map_err(sqlx_err)?;
    let timestamp_end = timestamp_end
        .map(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| AnalysisError::InvalidData(e.to_string()))
        })
        .transpose()?;

    let strategy_ids_raw: Option<String> = row.try_get("selected_strategy_ids").map_err(sqlx_err)?;
    let selected_strategy_ids = strategy_ids_raw
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    let errors_raw: Option<String> = row.try_get("errors").map_err(sqlx_err)?;
    let errors = errors_raw
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    let execution_type: String = row.try_get("execution_type").map_err(sqlx_err)?;
    let execution_mode: Option<String> = row.try_get("execution_mode").map_err(sqlx_err)?;

    Ok(Execution {
        execution_id: row.try_get("execution_id").map_err(sqlx_err)?,
        execution_type: ExecutionType::parse(&execution_type),
        symbol: row.try_get("symbol").map_err(sqlx_err)?,
        status,
        timestamp_start,
        timestamp_end,
        selected_strategy_ids,
        execution_mode: execution_mode.map(|m| ExecutionMode::parse(&m)).unwrap_or(ExecutionMode::Default),
        estimated_patterns: row.try_get("estimated_patterns").map_err(sqlx_err)?,
        progress_percentage: row.try_get("progress_percentage").map_err(sqlx_err)?,
        current_operation: row.try_get("current_operation").map_err(sqlx_err)?,
        errors,
    })
}

fn sqlx_err(e: sqlx::Error) -> AnalysisError {
    AnalysisError::DatabaseError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> ExecutionLogStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = ExecutionLogStore::new(pool);
        store.init_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn create_and_lookup_round_trips() {
        let store = store().await;
        let id = store
            .create_execution(NewExecutionRequest {
                symbol: "BTC".into(),
                execution_type: ExecutionType::SymbolAddition,
                selected_strategy_ids: vec![1, 2, 3],
                execution_mode: ExecutionMode::Selective,
                estimated_patterns: 12,
            })
            .await
            .unwrap();

        let exec = store.lookup(&id).await.unwrap().unwrap();
        assert_eq!(exec.symbol.as_deref(), Some("BTC"));
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert_eq!(exec.selected_strategy_ids, vec![1, 2, 3]);
        assert_eq!(exec.execution_mode, ExecutionMode::Selective);
    }

    #[tokio::test]
    async fn lifecycle_transitions_update_status_and_timestamps() {
        let store = store().await;
        let id = store
            .create_execution(NewExecutionRequest {
                symbol: "ETH".into(),
                execution_type: ExecutionType::SymbolAddition,
                selected_strategy_ids: vec![],
                execution_mode: ExecutionMode::Default,
                estimated_patterns: 4,
            })
            .await
            .unwrap();

        store.mark_running(&id).await.unwrap();
        assert_eq!(store.lookup(&id).await.unwrap().unwrap().status, ExecutionStatus::Running);

        store.update_progress(&id, 42.5, "running ml_prediction").await.unwrap();
        let exec = store.lookup(&id).await.unwrap().unwrap();
        assert_eq!(exec.progress_percentage, 42.5);
        assert_eq!(exec.current_operation.as_deref(), Some("running ml_prediction"));

        store.mark_success(&id).await.unwrap();
        let exec = store.lookup(&id).await.unwrap().unwrap();
        assert_eq!(exec.status, ExecutionStatus::Success);
        assert_eq!(exec.progress_percentage, 100.0);
        assert!(exec.timestamp_end.is_some());
    }

    #[tokio::test]
    async fn mark_failed_appends_to_errors() {
        let store = store().await;
        let id = store
            .create_execution(NewExecutionRequest {
                symbol: "SOL".into(),
                execution_type: ExecutionType::SymbolAddition,
                selected_strategy_ids: vec![],
                execution_mode: ExecutionMode::Default,
                estimated_patterns: 1,
            })
            .await
            .unwrap();

        store.mark_failed(&id, "data provider unreachable").await.unwrap();
        let exec = store.lookup(&id).await.unwrap().unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert_eq!(exec.errors, vec!["data provider unreachable".to_string()]);
    }

    #[tokio::test]
    async fn list_for_symbol_and_list_recent_filter_correctly() {
        let store = store().await;
        for symbol in ["BTC", "BTC", "ETH"] {
            store
                .create_execution(NewExecutionRequest {
                    symbol: symbol.into(),
                    execution_type: ExecutionType::SymbolAddition,
                    selected_strategy_ids: vec![],
                    execution_mode: ExecutionMode::Default,
                    estimated_patterns: 1,
                })
                .await
                .unwrap();
        }

        assert_eq!(store.list_for_symbol("BTC").await.unwrap().len(), 2);

        let pending = store
            .list_recent(RecentFilter { status: Some(ExecutionStatus::Pending), limit: Some(10) })
            .await
            .unwrap();
        assert_eq!(pending.len(), 3);
    }
}
