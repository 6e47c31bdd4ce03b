use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of request that produced an Execution. The source only ever raises
/// `SYMBOL_ADDITION`; the column stays a free string so future request types
/// don't require a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionType {
    SymbolAddition,
    Other(String),
}

impl ExecutionType {
    pub fn as_str(&self) -> &str {
        match self {
            ExecutionType::SymbolAddition => "SYMBOL_ADDITION",
            ExecutionType::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "SYMBOL_ADDITION" => ExecutionType::SymbolAddition,
            other => ExecutionType::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    DataDeleted,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::DataDeleted => "DATA_DELETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ExecutionStatus::Pending),
            "RUNNING" => Some(ExecutionStatus::Running),
            "SUCCESS" => Some(ExecutionStatus::Success),
            "FAILED" => Some(ExecutionStatus::Failed),
            "DATA_DELETED" => Some(ExecutionStatus::DataDeleted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::DataDeleted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Default,
    Selective,
    Custom,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Default => "default",
            ExecutionMode::Selective => "selective",
            ExecutionMode::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "selective" => ExecutionMode::Selective,
            "custom" => ExecutionMode::Custom,
            _ => ExecutionMode::Default,
        }
    }
}

/// Inputs needed to open a new Execution (§3).
#[derive(Debug, Clone)]
pub struct NewExecutionRequest {
    pub symbol: String,
    pub execution_type: ExecutionType,
    pub selected_strategy_ids: Vec<i64>,
    pub execution_mode: ExecutionMode,
    pub estimated_patterns: i64,
}

/// An Execution row (§3), as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: String,
    pub execution_type: ExecutionType,
    pub symbol: Option<String>,
    pub status: ExecutionStatus,
    pub timestamp_start: DateTime<Utc>,
    pub timestamp_end: Option<DateTime<Utc>>,
    pub selected_strategy_ids: Vec<i64>,
    pub execution_mode: ExecutionMode,
    pub estimated_patterns: i64,
    pub progress_percentage: f64,
    pub current_operation: Option<String>,
    pub errors: Vec<String>,
}

/// Filter accepted by `list_recent`.
#[derive(Debug, Clone, Default)]
pub struct RecentFilter {
    pub status: Option<ExecutionStatus>,
    pub limit: Option<i64>,
}
