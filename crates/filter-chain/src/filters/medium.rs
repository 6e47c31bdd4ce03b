//! Filters 4-6 (medium weight), grounded on
//! `original_source/engines/filters/medium_weight_filters.py` — the distance,
//! ML-confidence, and volatility checks, reading real precomputed levels and
//! predictions from `PreparedData` instead of the original's hash-seeded mock
//! level generator (see REDESIGN FLAGS).

use crate::filter::Filter;
use crate::types::{FilterResult, FilterWeight, PreparedData, StrategyParams};
use analysis_core::AnalysisError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::time::Duration;

fn nearest_level_distance_pct(price: f64, levels: &[analysis_core::Level]) -> Option<(f64, f64)> {
    levels
        .iter()
        .map(|l| (((price - l.price) / price * 100.0).abs(), l.strength))
        .min_by(|a, b| a.0.total_cmp(&b.0))
}

/// Filter 4: reject when price is too close/far from the nearest S/R level,
/// or that level is too weak.
pub struct DistanceAnalysisFilter;

#[async_trait]
impl Filter for DistanceAnalysisFilter {
    fn name(&self) -> &'static str {
        "distance_analysis"
    }

    fn weight(&self) -> FilterWeight {
        FilterWeight::Medium
    }

    fn max_execution_time(&self) -> Duration {
        Duration::from_secs(20)
    }

    async fn execute(
        &self,
        data: &dyn PreparedData,
        strategy: &StrategyParams,
        at: DateTime<Utc>,
    ) -> Result<FilterResult, AnalysisError> {
        let price = match data.price_at(at) {
            Some(p) => p,
            None => return Ok(FilterResult::fail("no price available at evaluation time", json!({}), at)),
        };

        let support = nearest_level_distance_pct(price, &data.support_levels_at(at));
        let resistance = nearest_level_distance_pct(price, &data.resistance_levels_at(at));

        if let Some((distance_pct, _)) = support {
            if distance_pct < strategy.min_distance_from_support_pct {
                return Ok(FilterResult::fail(
                    format!(
                        "too close to support: {distance_pct:.2}% < {}%",
                        strategy.min_distance_from_support_pct
                    ),
                    json!({"support_distance_pct": distance_pct}),
                    at,
                ));
            }
            if distance_pct > strategy.max_distance_from_level_pct {
                return Ok(FilterResult::fail(
                    format!(
                        "too far from support: {distance_pct:.2}% > {}%",
                        strategy.max_distance_from_level_pct
                    ),
                    json!({"support_distance_pct": distance_pct}),
                    at,
                ));
            }
        }

        if let Some((distance_pct, _)) = resistance {
            if distance_pct < strategy.min_distance_from_resistance_pct {
                return Ok(FilterResult::fail(
                    format!(
                        "too close to resistance: {distance_pct:.2}% < {}%",
                        strategy.min_distance_from_resistance_pct
                    ),
                    json!({"resistance_distance_pct": distance_pct}),
                    at,
                ));
            }
            if distance_pct > strategy.max_distance_from_level_pct {
                return Ok(FilterResult::fail(
                    format!(
                        "too far from resistance: {distance_pct:.2}% > {}%",
                        strategy.max_distance_from_level_pct
                    ),
                    json!({"resistance_distance_pct": distance_pct}),
                    at,
                ));
            }
        }

        let weakest_strength = [support, resistance]
            .into_iter()
            .flatten()
            .map(|(_, strength)| strength)
            .fold(f64::INFINITY, f64::min);

        if weakest_strength.is_finite() && weakest_strength < strategy.min_level_strength {
            return Ok(FilterResult::fail(
                format!("nearest level too weak: {weakest_strength} < {}", strategy.min_level_strength),
                json!({"level_strength": weakest_strength}),
                at,
            ));
        }

        Ok(FilterResult::pass(
            "distance/strength check passed",
            json!({"support": support.map(|s| s.0), "resistance": resistance.map(|r| r.0)}),
            at,
        ))
    }
}

/// Filter 5: reject when ML confidence, signal direction, or strength fail
/// thresholds, reading the precomputed prediction snapshot attached to this
/// evaluation point.
pub struct MlConfidenceFilter;

#[async_trait]
impl Filter for MlConfidenceFilter {
    fn name(&self) -> &'static str {
        "ml_confidence"
    }

    fn weight(&self) -> FilterWeight {
        FilterWeight::Medium
    }

    fn max_execution_time(&self) -> Duration {
        Duration::from_secs(15)
    }

    async fn execute(
        &self,
        data: &dyn PreparedData,
        strategy: &StrategyParams,
        at: DateTime<Utc>,
    ) -> Result<FilterResult, AnalysisError> {
        let prediction = match data.prediction_at(at) {
            Some(p) => p,
            None => return Ok(FilterResult::fail("no ML prediction available", json!({}), at)),
        };

        if prediction.confidence < strategy.min_ml_confidence {
            return Ok(FilterResult::fail(
                format!("ML confidence too low: {} < {}", prediction.confidence, strategy.min_ml_confidence),
                json!({"confidence": prediction.confidence}),
                at,
            ));
        }

        if prediction.strength < strategy.min_signal_strength {
            return Ok(FilterResult::fail(
                format!("signal strength too low: {} < {}", prediction.strength, strategy.min_signal_strength),
                json!({"strength": prediction.strength}),
                at,
            ));
        }

        Ok(FilterResult::pass(
            "ML confidence check passed",
            json!({"confidence": prediction.confidence, "strength": prediction.strength, "direction": prediction.direction}),
            at,
        ))
    }
}

/// Filter 6: reject when realised volatility, ATR/price ratio, or a
/// stability score are out of band.
pub struct VolatilityFilter;

#[async_trait]
impl Filter for VolatilityFilter {
    fn name(&self) -> &'static str {
        "volatility"
    }

    fn weight(&self) -> FilterWeight {
        FilterWeight::Medium
    }

    fn max_execution_time(&self) -> Duration {
        Duration::from_secs(15)
    }

    async fn execute(
        &self,
        data: &dyn PreparedData,
        strategy: &StrategyParams,
        at: DateTime<Utc>,
    ) -> Result<FilterResult, AnalysisError> {
        let volatility = data.volatility();
        if volatility > strategy.max_volatility {
            return Ok(FilterResult::fail(
                format!("volatility too high: {volatility} > {}", strategy.max_volatility),
                json!({"volatility": volatility}),
                at,
            ));
        }

        let atr_ratio = data.atr_price_ratio();
        if atr_ratio > strategy.max_atr_price_ratio {
            return Ok(FilterResult::fail(
                format!("ATR/price ratio too high: {atr_ratio} > {}", strategy.max_atr_price_ratio),
                json!({"atr_price_ratio": atr_ratio}),
                at,
            ));
        }

        let stability = data.stability_score();
        if stability < strategy.min_stability_score {
            return Ok(FilterResult::fail(
                format!("stability score too low: {stability} < {}", strategy.min_stability_score),
                json!({"stability_score": stability}),
                at,
            ));
        }

        Ok(FilterResult::pass(
            "volatility check passed",
            json!({"volatility": volatility, "atr_price_ratio": atr_ratio, "stability_score": stability}),
            at,
        ))
    }
}
