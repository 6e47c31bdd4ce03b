use analysis_core::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a single stage sub-record within a Progress Record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
}

/// A detected level, as rendered into the Progress Record schema (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelInfo {
    pub price: f64,
    pub strength: f64,
    pub touch_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportResistanceResult {
    pub status: StageStatus,
    #[serde(default)]
    pub supports_count: u32,
    #[serde(default)]
    pub resistances_count: u32,
    #[serde(default)]
    pub supports: Vec<LevelInfo>,
    #[serde(default)]
    pub resistances: Vec<LevelInfo>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Default for SupportResistanceResult {
    fn default() -> Self {
        Self {
            status: StageStatus::Pending,
            supports_count: 0,
            resistances_count: 0,
            supports: Vec::new(),
            resistances: Vec::new(),
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlPredictionResult {
    pub status: StageStatus,
    #[serde(default)]
    pub predictions_count: u32,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl Default for MlPredictionResult {
    fn default() -> Self {
        Self {
            status: StageStatus::Pending,
            predictions_count: 0,
            confidence: 0.0,
            error_message: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketContextResult {
    #[serde(default)]
    pub status: Option<StageStatus>,
    #[serde(default)]
    pub trend_direction: Option<String>,
    #[serde(default)]
    pub market_phase: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeverageDecisionResult {
    #[serde(default)]
    pub status: Option<StageStatus>,
    #[serde(default)]
    pub recommended_leverage: Option<f64>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub risk_reward_ratio: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Running,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalSignal {
    Analyzing,
    SignalDetected,
    NoSignal,
}

/// Live, cross-process-readable status of one execution (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub symbol: String,
    pub execution_id: String,
    pub start_time: DateTime<Utc>,
    pub current_stage: Stage,
    pub overall_status: OverallStatus,
    #[serde(default)]
    pub support_resistance: SupportResistanceResult,
    #[serde(default)]
    pub ml_prediction: MlPredictionResult,
    #[serde(default)]
    pub market_context: MarketContextResult,
    #[serde(default)]
    pub leverage_decision: LeverageDecisionResult,
    pub final_signal: FinalSignal,
    #[serde(default)]
    pub failure_stage: Option<Stage>,
    #[serde(default)]
    pub final_message: Option<String>,
}

impl ProgressRecord {
    pub fn new(symbol: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            execution_id: execution_id.into(),
            start_time: Utc::now(),
            current_stage: Stage::Initializing,
            overall_status: OverallStatus::Running,
            support_resistance: SupportResistanceResult::default(),
            ml_prediction: MlPredictionResult::default(),
            market_context: MarketContextResult::default(),
            leverage_decision: LeverageDecisionResult::default(),
            final_signal: FinalSignal::Analyzing,
            failure_stage: None,
            final_message: None,
        }
    }
}
