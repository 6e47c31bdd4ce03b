//! Strategy Catalog (C4, spec §4.4) — read-mostly store of named parameter
//! bundles. Configurations are created/updated via an admin path that is out
//! of scope here; this crate only reads.

pub mod models;
pub mod validator;

pub use models::*;
pub use validator::StrategyConfigValidator;

use analysis_core::AnalysisError;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

const SELECT_COLUMNS: &str = "id, name, base_strategy, timeframe, parameters, description, \
    is_default, is_active, created_by, version";

#[derive(Clone)]
pub struct StrategyCatalog {
    pool: SqlitePool,
}

impl StrategyCatalog {
    pub async fn new(pool: SqlitePool) -> Result<Self, AnalysisError> {
        let catalog = Self { pool };
        catalog.init_schema().await?;
        Ok(catalog)
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

    /// All configurations marked `is_default` and currently active.
    pub async fn get_defaults(&self) -> Result<Vec<StrategyConfiguration>, AnalysisError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM strategy_configurations WHERE is_default = 1 AND is_active = 1 ORDER BY id"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await.map_err(sqlx_err)?;
        rows.into_iter().map(row_to_config).collect()
    }

    pub async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<StrategyConfiguration>, AnalysisError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM strategy_configurations WHERE id IN ({placeholders}) ORDER BY id"
        );
        let mut q = sqlx::query(&query);
        for id in ids {
            q = q.bind(id);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(sqlx_err)?;
        rows.into_iter().map(row_to_config).collect()
    }

    pub async fn list_active(&self) -> Result<Vec<StrategyConfiguration>, AnalysisError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM strategy_configurations WHERE is_active = 1 ORDER BY id"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await.map_err(sqlx_err)?;
        rows.into_iter().map(row_to_config).collect()
    }

    /// Test/admin-path helper: insert a configuration, validating its
    /// `parameters` shape first.
    pub async fn insert(
        &self,
        name: &str,
        base_strategy: &str,
        timeframe: &str,
        parameters: serde_json::Value,
        is_default: bool,
    ) -> Result<i64, AnalysisError> {
        StrategyConfigValidator::validate(&parameters)?;
        let parameters_json = serde_json::to_string(&parameters)
            .map_err(|e| AnalysisError::InvalidData(e.to_string()))?;

        let row = sqlx::query(
            "INSERT INTO strategy_configurations (name, base_strategy, timeframe, parameters, is_default, is_active)
             VALUES (?, ?, ?, ?, ?, 1) RETURNING id",
        )
        .bind(name)
        .bind(base_strategy)
        .bind(timeframe)
        .bind(parameters_json)
        .bind(is_default)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_err)?;

        row.try_get::<i64, _>("id").map_err(sqlx_err)
    }
}

fn row_to_config(row: sqlx::sqlite::SqliteRow) -> Result<StrategyConfiguration, AnalysisError> {
    let parameters_raw: String = row.try_get("parameters").map_err(sqlx_err)?;
    let parameters: serde_json::Value =
        serde_json::from_str(&parameters_raw).map_err(|e| AnalysisError::InvalidData(e.to_string()))?;

    Ok(StrategyConfiguration {
        id: row.try_get("id").map_err(sqlx_err)?,
        name: row.try_get("name").map_err(sqlx_err)?,
        base_strategy: row.try_get("base_strategy").map_err(sqlx_err)?,
        timeframe: row.try_get("timeframe").map_err(sqlx_err)?,
        parameters,
        description: row.try_get("description").map_err(sqlx_err)?,
        is_default: row.try_get("is_default").map_err(sqlx_err)?,
        is_active: row.try_get("is_active").map_err(sqlx_err)?,
        created_by: row.try_get("created_by").map_err(sqlx_err)?,
        version: row.try_get("version").map_err(sqlx_err)?,
    })
}

fn sqlx_err(e: sqlx::Error) -> AnalysisError {
    AnalysisError::DatabaseError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn catalog() -> StrategyCatalog {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        StrategyCatalog::new(pool).await.unwrap()
    }

    #[tokio::test]
    async fn get_defaults_returns_only_default_active_rows() {
        let catalog = catalog().await;
        catalog
            .insert("momentum-default", "momentum", "15m", json!({"min_touch_count": 2}), true)
            .await
            .unwrap();
        catalog
            .insert("momentum-custom", "momentum", "1h", json!({"min_touch_count": 3}), false)
            .await
            .unwrap();

        let defaults = catalog.get_defaults().await.unwrap();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].name, "momentum-default");
    }

    #[tokio::test]
    async fn get_by_ids_preserves_nothing_for_empty_input() {
        let catalog = catalog().await;
        assert!(catalog.get_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_by_ids_fetches_requested_rows() {
        let catalog = catalog().await;
        let id1 = catalog
            .insert("a", "momentum", "15m", json!({}), false)
            .await
            .unwrap();
        let id2 = catalog
            .insert("b", "mean-reversion", "1h", json!({}), false)
            .await
            .unwrap();

        let configs = catalog.get_by_ids(&[id1, id2]).await.unwrap();
        assert_eq!(configs.len(), 2);
    }

    #[tokio::test]
    async fn unique_constraint_rejects_duplicate_name_strategy_timeframe() {
        let catalog = catalog().await;
        catalog
            .insert("dup", "momentum", "15m", json!({}), false)
            .await
            .unwrap();
        let result = catalog
            .insert("dup", "momentum", "15m", json!({}), false)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn insert_rejects_non_object_parameters() {
        let catalog = catalog().await;
        let result = catalog
            .insert("bad", "momentum", "15m", json!([1, 2, 3]), false)
            .await;
        assert!(result.is_err());
    }
}
