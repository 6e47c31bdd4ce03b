use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

/// Fields needed to open a new Analysis Task (§3).
#[derive(Debug, Clone)]
pub struct NewTask {
    pub execution_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub config: String,
    pub strategy_config_id: Option<i64>,
    pub strategy_name: Option<String>,
}

/// Result fields written on task completion.
#[derive(Debug, Clone, Default)]
pub struct TaskResults {
    pub total_trades: Option<i64>,
    pub win_rate: Option<f64>,
    pub total_return: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub avg_leverage: Option<f64>,
    pub chart_path: Option<String>,
    pub compressed_path: Option<String>,
}

/// An Analysis Task row (§3), as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub id: i64,
    pub execution_id: String,
    pub symbol: String,
    pub timeframe: String,
    pub config: String,
    pub strategy_config_id: Option<i64>,
    pub strategy_name: Option<String>,
    pub task_status: TaskStatus,
    pub task_created_at: Option<String>,
    pub task_started_at: Option<String>,
    pub task_completed_at: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub total_trades: Option<i64>,
    pub win_rate: Option<f64>,
    pub total_return: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub avg_leverage: Option<f64>,
    pub chart_path: Option<String>,
    pub compressed_path: Option<String>,
}

/// Count of tasks per status for one execution, as returned by `count_by_status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.running + self.completed + self.failed
    }

    /// True while the owning Execution should still be considered PENDING or
    /// RUNNING (§3 invariant: pending+running > 0 ⇔ Execution not terminal).
    pub fn has_unfinished(&self) -> bool {
        self.pending + self.running > 0
    }
}

/// Maximum length `error_message` is truncated to on write (§4.2).
pub const ERROR_MESSAGE_MAX_LEN: usize = 500;

pub fn truncate_error_message(message: &str) -> String {
    if message.chars().count() <= ERROR_MESSAGE_MAX_LEN {
        message.to_string()
    } else {
        message.chars().take(ERROR_MESSAGE_MAX_LEN).collect()
    }
}
