//! The Analysis Result Model (C6, spec §4.6): a pure data record the
//! Orchestrator constructs per task and mutates as stages run.

use analysis_core::{ErrorKind, ExitReason, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One stage's outcome within a single task's run (§3 Analysis Result).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: Stage,
    pub success: bool,
    pub execution_time_ms: u64,
    #[serde(default)]
    pub data_processed: Option<i64>,
    #[serde(default)]
    pub items_found: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Exception classification preserved alongside the error message, so
/// callers can distinguish error kinds rather than just message text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub kind: ErrorKind,
    pub message: String,
}

/// Per-task outcome returned by the Orchestrator (§3 Analysis Result).
/// Exactly one of `completed`, `early_exit`, or `error_details` describes
/// the outcome; `exit_stage`/`exit_reason` are set iff `early_exit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub symbol: String,
    pub timeframe: String,
    pub strategy: String,
    pub execution_id: String,
    pub completed: bool,
    pub early_exit: bool,
    #[serde(default)]
    pub exit_stage: Option<Stage>,
    #[serde(default)]
    pub exit_reason: Option<ExitReason>,
    pub stage_results: Vec<StageResult>,
    #[serde(default)]
    pub total_data_points: Option<i64>,
    #[serde(default)]
    pub recommendation: Option<Value>,
    #[serde(default)]
    pub error_details: Option<ErrorDetails>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisResult {
    pub fn new(symbol: impl Into<String>, timeframe: impl Into<String>, strategy: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            strategy: strategy.into(),
            execution_id: execution_id.into(),
            completed: false,
            early_exit: false,
            exit_stage: None,
            exit_reason: None,
            stage_results: Vec::new(),
            total_data_points: None,
            recommendation: None,
            error_details: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn record_stage(&mut self, result: StageResult) {
        self.stage_results.push(result);
    }

    pub fn into_early_exit(mut self, stage: Stage, reason: ExitReason, message: impl Into<String>) -> Self {
        if let Some(last) = self.stage_results.last_mut() {
            if last.stage == stage && last.success {
                last.success = false;
                last.error_message = Some(message.into());
            }
        }
        self.early_exit = true;
        self.exit_stage = Some(stage);
        self.exit_reason = Some(reason);
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn into_error(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.error_details = Some(ErrorDetails { kind, message: message.into() });
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn into_completed(mut self, recommendation: Value) -> Self {
        self.completed = true;
        self.recommendation = Some(recommendation);
        self.completed_at = Some(Utc::now());
        self
    }

    /// One-line human summary keyed by completed/early_exit/error (§4.6).
    pub fn user_message(&self) -> String {
        if self.completed {
            format!("{} ({} / {}): signal found", self.symbol, self.timeframe, self.strategy)
        } else if self.early_exit {
            let reason = self.exit_reason.map(|r| format!("{r:?}")).unwrap_or_default();
            format!("{} ({} / {}): no trade — {}", self.symbol, self.timeframe, self.strategy, reason)
        } else if let Some(details) = &self.error_details {
            format!("{} ({} / {}): error — {}", self.symbol, self.timeframe, self.strategy, details.message)
        } else {
            format!("{} ({} / {}): analysis incomplete", self.symbol, self.timeframe, self.strategy)
        }
    }

    /// Developer-facing summary including data counts and exit reason (§4.6).
    pub fn detailed_log_message(&self) -> String {
        let stages: Vec<String> = self
            .stage_results
            .iter()
            .map(|s| format!("{:?}={}({}ms)", s.stage, if s.success { "ok" } else { "fail" }, s.execution_time_ms))
            .collect();

        format!(
            "execution={} symbol={} timeframe={} strategy={} completed={} early_exit={} exit_stage={:?} exit_reason={:?} total_data_points={:?} stages=[{}] error={:?}",
            self.execution_id,
            self.symbol,
            self.timeframe,
            self.strategy,
            self.completed,
            self.early_exit,
            self.exit_stage,
            self.exit_reason,
            self.total_data_points,
            stages.join(", "),
            self.error_details.as_ref().map(|d| &d.message),
        )
    }

    /// Static remediation hints keyed by exit reason (§4.6), used by the
    /// Notifier and the dashboard.
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self.exit_reason {
            Some(reason) => vec![reason.suggestion()],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_exit_marks_the_triggering_stage_as_failed() {
        let mut result = AnalysisResult::new("BTC", "1h", "momentum", "exec-1");
        result.record_stage(StageResult {
            stage: Stage::SupportResistance,
            success: true,
            execution_time_ms: 5,
            data_processed: Some(100),
            items_found: Some(0),
            error_message: None,
        });
        let result = result.into_early_exit(Stage::SupportResistance, ExitReason::NoSupportResistance, "no levels detected");

        assert!(result.early_exit);
        assert!(!result.completed);
        assert_eq!(result.exit_stage, Some(Stage::SupportResistance));
        assert!(!result.stage_results[0].success);
        assert_eq!(result.suggestions().len(), 1);
    }

    #[test]
    fn completed_result_carries_a_recommendation_and_no_exit_reason() {
        let result = AnalysisResult::new("BTC", "1h", "momentum", "exec-2")
            .into_completed(serde_json::json!({"leverage": 3.0}));

        assert!(result.completed);
        assert!(!result.early_exit);
        assert!(result.exit_reason.is_none());
        assert!(result.recommendation.is_some());
        assert!(result.user_message().contains("signal found"));
    }

    #[test]
    fn error_result_is_distinct_from_early_exit() {
        let result = AnalysisResult::new("BTC", "1h", "momentum", "exec-3")
            .into_error(ErrorKind::Database, "progress store write failed");

        assert!(!result.completed);
        assert!(!result.early_exit);
        assert!(result.error_details.is_some());
        assert!(result.user_message().contains("error"));
    }

    #[test]
    fn round_trip_serialization_preserves_stage_timings() {
        let mut result = AnalysisResult::new("ETH", "15m", "mean_reversion", "exec-4");
        result.record_stage(StageResult {
            stage: Stage::DataFetch,
            success: true,
            execution_time_ms: 42,
            data_processed: Some(500),
            items_found: None,
            error_message: None,
        });
        let result = result.into_completed(serde_json::json!({}));

        let json = serde_json::to_string(&result).unwrap();
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stage_results[0].execution_time_ms, 42);
        assert_eq!(back.stage_results.len(), result.stage_results.len());
    }
}
