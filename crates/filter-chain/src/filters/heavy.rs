//! Filters 7-9 (heavy weight), grounded on
//! `original_source/engines/filters/heavy_weight_filters.py`. The real
//! leverage-math engine and ML model are external collaborators out of
//! scope; these filters depend only on the `LeverageEngine`/`MlPredictor`
//! traits, so the chain stays fully testable against deterministic stubs
//! (see REDESIGN FLAGS — this replaces the original's hash-seeded fallback).

use crate::filter::Filter;
use crate::types::{FilterResult, FilterWeight, PreparedData, StrategyParams, StrategyType};
use analysis_core::{AnalysisError, LeverageEngine, MlPredictor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Filter 7: compute optimal leverage, reject extreme or low-confidence
/// recommendations.
pub struct LeverageFilter {
    pub engine: Arc<dyn LeverageEngine>,
}

#[async_trait]
impl Filter for LeverageFilter {
    fn name(&self) -> &'static str {
        "leverage"
    }

    fn weight(&self) -> FilterWeight {
        FilterWeight::Heavy
    }

    fn max_execution_time(&self) -> Duration {
        Duration::from_secs(3)
    }

    async fn execute(
        &self,
        data: &dyn PreparedData,
        strategy: &StrategyParams,
        at: DateTime<Utc>,
    ) -> Result<FilterResult, AnalysisError> {
        let price = data.price_at(at).unwrap_or(0.0);
        let volatility = data.volatility();

        let rec = self.engine.optimal_leverage(data.symbol(), price, volatility).await?;

        if rec.recommended_leverage > strategy.max_leverage {
            return Ok(FilterResult::fail(
                format!("leverage too extreme: {} > {}", rec.recommended_leverage, strategy.max_leverage),
                json!({"leverage": rec.recommended_leverage, "confidence": rec.confidence_level}),
                at,
            ));
        }

        if rec.confidence_level < strategy.min_leverage_confidence {
            return Ok(FilterResult::fail(
                format!(
                    "leverage recommendation confidence too low: {} < {}",
                    rec.confidence_level, strategy.min_leverage_confidence
                ),
                json!({"leverage": rec.recommended_leverage, "confidence": rec.confidence_level}),
                at,
            ));
        }

        Ok(FilterResult::pass(
            "leverage optimization passed",
            json!({
                "leverage": rec.recommended_leverage,
                "confidence": rec.confidence_level,
                "risk_reward_ratio": rec.risk_reward_ratio,
                "max_loss_pct": rec.max_loss_pct,
            }),
            at,
        ))
    }
}

/// Filter 8: compute risk:reward, expected value, and Kelly fraction; reject
/// negative expectation.
pub struct RiskRewardFilter {
    pub engine: Arc<dyn LeverageEngine>,
}

#[async_trait]
impl Filter for RiskRewardFilter {
    fn name(&self) -> &'static str {
        "risk_reward"
    }

    fn weight(&self) -> FilterWeight {
        FilterWeight::Heavy
    }

    fn max_execution_time(&self) -> Duration {
        Duration::from_secs(3)
    }

    async fn execute(
        &self,
        data: &dyn PreparedData,
        strategy: &StrategyParams,
        at: DateTime<Utc>,
    ) -> Result<FilterResult, AnalysisError> {
        let price = data.price_at(at).unwrap_or(0.0);
        let volatility = data.volatility();
        let rec = self.engine.optimal_leverage(data.symbol(), price, volatility).await?;

        if rec.risk_reward_ratio < strategy.min_risk_reward {
            return Ok(FilterResult::fail(
                format!("risk:reward below threshold: {} < {}", rec.risk_reward_ratio, strategy.min_risk_reward),
                json!({"risk_reward": rec.risk_reward_ratio}),
                at,
            ));
        }

        let win_prob = rec.confidence_level.clamp(0.0, 1.0);
        let expected_value = win_prob * rec.risk_reward_ratio - (1.0 - win_prob);
        if expected_value <= 0.0 {
            return Ok(FilterResult::fail(
                format!("negative expected value: {expected_value:.3}"),
                json!({"expected_value": expected_value, "risk_reward": rec.risk_reward_ratio}),
                at,
            ));
        }

        let kelly_fraction = (win_prob * (rec.risk_reward_ratio + 1.0) - 1.0) / rec.risk_reward_ratio.max(f64::EPSILON);

        Ok(FilterResult::pass(
            "risk:reward check passed",
            json!({
                "risk_reward": rec.risk_reward_ratio,
                "expected_value": expected_value,
                "kelly_fraction": kelly_fraction.clamp(0.0, 1.0),
            }),
            at,
        ))
    }
}

/// Filter 9: apply ML- or TA-specific quality checks and a strategy-type
/// suitability gate.
pub struct StrategySpecificFilter {
    pub predictor: Arc<dyn MlPredictor>,
}

#[async_trait]
impl Filter for StrategySpecificFilter {
    fn name(&self) -> &'static str {
        "strategy_specific"
    }

    fn weight(&self) -> FilterWeight {
        FilterWeight::Heavy
    }

    fn max_execution_time(&self) -> Duration {
        Duration::from_secs(3)
    }

    async fn execute(
        &self,
        data: &dyn PreparedData,
        strategy: &StrategyParams,
        at: DateTime<Utc>,
    ) -> Result<FilterResult, AnalysisError> {
        match strategy.strategy_type {
            StrategyType::MlBased => {
                let prediction = self.predictor.confidence_for(data.symbol(), at).await?;
                if prediction.confidence < strategy.min_ml_confidence {
                    return Ok(FilterResult::fail(
                        format!(
                            "ml-based strategy requires higher confidence: {} < {}",
                            prediction.confidence, strategy.min_ml_confidence
                        ),
                        json!({"confidence": prediction.confidence}),
                        at,
                    ));
                }
                Ok(FilterResult::pass(
                    "ml-based strategy suitability passed",
                    json!({"confidence": prediction.confidence}),
                    at,
                ))
            }
            StrategyType::Momentum | StrategyType::MeanReversion => {
                let strength = data.stability_score();
                if strength < strategy.min_stability_score {
                    return Ok(FilterResult::fail(
                        "price action not stable enough for this strategy type",
                        json!({"stability_score": strength}),
                        at,
                    ));
                }
                Ok(FilterResult::pass(
                    "strategy-type suitability passed",
                    json!({"stability_score": strength}),
                    at,
                ))
            }
        }
    }
}
