use serde::{Deserialize, Serialize};

/// A named parameter bundle (§3). `parameters` is opaque JSON to this crate —
/// semantic validation of individual filter ranges happens in `filter-params`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfiguration {
    pub id: i64,
    pub name: String,
    pub base_strategy: String,
    pub timeframe: String,
    pub parameters: serde_json::Value,
    pub description: Option<String>,
    pub is_default: bool,
    pub is_active: bool,
    pub created_by: String,
    pub version: i64,
}
