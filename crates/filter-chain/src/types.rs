use analysis_core::{Direction, Level, Prediction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Processing weight class for a filter (§4.5 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterWeight {
    Light,
    Medium,
    Heavy,
}

/// Outcome of a single filter's `execute` (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    pub passed: bool,
    pub reason: String,
    #[serde(default)]
    pub metrics: Value,
    pub timestamp: DateTime<Utc>,
}

impl FilterResult {
    pub fn pass(reason: impl Into<String>, metrics: Value, timestamp: DateTime<Utc>) -> Self {
        Self { passed: true, reason: reason.into(), metrics, timestamp }
    }

    pub fn fail(reason: impl Into<String>, metrics: Value, timestamp: DateTime<Utc>) -> Self {
        Self { passed: false, reason: reason.into(), metrics, timestamp }
    }

    pub fn execution_error(reason: impl std::fmt::Display, timestamp: DateTime<Utc>) -> Self {
        Self {
            passed: false,
            reason: format!("execution error: {reason}"),
            metrics: json!({"error": reason.to_string()}),
            timestamp,
        }
    }
}

/// Tunable thresholds a strategy configuration supplies to the chain. Values
/// not carried in the opaque strategy-config JSON fall back to these
/// hard-coded defaults, mirroring the params-with-fallback pattern
/// `filter-params` already uses for Filter 3.
#[derive(Debug, Clone)]
pub struct StrategyParams {
    pub name: String,
    pub strategy_type: StrategyType,
    pub min_volume_threshold: f64,
    pub max_spread_pct: f64,
    pub min_liquidity_score: f64,
    pub min_distance_from_support_pct: f64,
    pub min_distance_from_resistance_pct: f64,
    pub max_distance_from_level_pct: f64,
    pub min_level_strength: f64,
    pub min_ml_confidence: f64,
    pub min_signal_strength: f64,
    pub max_volatility: f64,
    pub min_stability_score: f64,
    pub max_atr_price_ratio: f64,
    pub max_leverage: f64,
    pub min_leverage_confidence: f64,
    pub min_risk_reward: f64,
    pub risk_tolerance: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            strategy_type: StrategyType::Momentum,
            min_volume_threshold: 1_000.0,
            max_spread_pct: 0.5,
            min_liquidity_score: 0.3,
            min_distance_from_support_pct: 0.5,
            min_distance_from_resistance_pct: 1.0,
            max_distance_from_level_pct: 5.0,
            min_level_strength: 0.5,
            min_ml_confidence: 0.6,
            min_signal_strength: 0.5,
            max_volatility: 0.08,
            min_stability_score: 0.4,
            max_atr_price_ratio: 0.06,
            max_leverage: 10.0,
            min_leverage_confidence: 0.5,
            min_risk_reward: 1.5,
            risk_tolerance: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    Momentum,
    MeanReversion,
    MlBased,
}

/// Source of evaluation-window data for the chain: precomputed OHLCV,
/// already-detected support/resistance levels, and a precomputed ML
/// prediction snapshot. Real implementations sit in `analysis-orchestrator`;
/// this trait is the seam so `filter-chain` is independently testable.
pub trait PreparedData: Send + Sync {
    fn symbol(&self) -> &str;
    fn price_at(&self, at: DateTime<Utc>) -> Option<f64>;
    fn volume_at(&self, at: DateTime<Utc>) -> Option<f64>;
    fn spread_pct_at(&self, at: DateTime<Utc>) -> Option<f64>;
    fn liquidity_score_at(&self, at: DateTime<Utc>) -> Option<f64>;
    fn has_missing_data_around(&self, at: DateTime<Utc>) -> bool;
    fn has_price_anomaly_at(&self, at: DateTime<Utc>) -> bool;
    fn is_valid(&self) -> bool;
    fn volatility(&self) -> f64;
    fn atr_price_ratio(&self) -> f64;
    fn stability_score(&self) -> f64;
    fn support_levels_at(&self, at: DateTime<Utc>) -> Vec<Level>;
    fn resistance_levels_at(&self, at: DateTime<Utc>) -> Vec<Level>;
    fn prediction_at(&self, at: DateTime<Utc>) -> Option<Prediction>;
}

/// A trade opportunity constructed once all nine filters pass (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidTrade {
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub strategy_name: String,
    pub leverage: f64,
    pub profit_potential: f64,
    pub downside_risk: f64,
    pub risk_reward: f64,
    pub confidence: f64,
    pub direction: Direction,
}
