//! Filters 1-3 (light weight), grounded on `original_source/engines/filters/base_filter.py`.

use crate::filter::Filter;
use crate::types::{FilterResult, FilterWeight, PreparedData, StrategyParams};
use analysis_core::AnalysisError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filter_params::FilterParams;
use serde_json::json;
use std::time::Duration;

/// Filter 1: reject missing OHLCV, price anomalies, or otherwise-invalid data.
pub struct DataQualityFilter;

#[async_trait]
impl Filter for DataQualityFilter {
    fn name(&self) -> &'static str {
        "data_quality"
    }

    fn weight(&self) -> FilterWeight {
        FilterWeight::Light
    }

    fn max_execution_time(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn execute(
        &self,
        data: &dyn PreparedData,
        _strategy: &StrategyParams,
        at: DateTime<Utc>,
    ) -> Result<FilterResult, AnalysisError> {
        if data.has_missing_data_around(at) {
            return Ok(FilterResult::fail(
                "missing data detected around evaluation time",
                json!({"has_missing_data": true}),
                at,
            ));
        }
        if data.has_price_anomaly_at(at) {
            return Ok(FilterResult::fail(
                "price anomaly detected at evaluation time",
                json!({"has_price_anomaly": true}),
                at,
            ));
        }
        if !data.is_valid() {
            return Ok(FilterResult::fail("data is invalid", json!({"data_valid": false}), at));
        }
        Ok(FilterResult::pass("data quality check passed", json!({"data_quality_score": 1.0}), at))
    }
}

/// Filter 2: reject when volume, spread, or liquidity fail strategy thresholds.
pub struct MarketConditionFilter;

#[async_trait]
impl Filter for MarketConditionFilter {
    fn name(&self) -> &'static str {
        "market_condition"
    }

    fn weight(&self) -> FilterWeight {
        FilterWeight::Light
    }

    fn max_execution_time(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn execute(
        &self,
        data: &dyn PreparedData,
        strategy: &StrategyParams,
        at: DateTime<Utc>,
    ) -> Result<FilterResult, AnalysisError> {
        let volume = data.volume_at(at).unwrap_or(0.0);
        if volume < strategy.min_volume_threshold {
            return Ok(FilterResult::fail(
                format!("volume too low: {volume} < {}", strategy.min_volume_threshold),
                json!({"volume": volume, "threshold": strategy.min_volume_threshold}),
                at,
            ));
        }

        let spread_pct = data.spread_pct_at(at).unwrap_or(0.0);
        if spread_pct > strategy.max_spread_pct {
            return Ok(FilterResult::fail(
                format!("spread too wide: {spread_pct}% > {}%", strategy.max_spread_pct),
                json!({"spread_pct": spread_pct, "threshold": strategy.max_spread_pct}),
                at,
            ));
        }

        let liquidity = data.liquidity_score_at(at).unwrap_or(0.0);
        if liquidity < strategy.min_liquidity_score {
            return Ok(FilterResult::fail(
                format!("liquidity too low: {liquidity} < {}", strategy.min_liquidity_score),
                json!({"liquidity_score": liquidity, "threshold": strategy.min_liquidity_score}),
                at,
            ));
        }

        Ok(FilterResult::pass(
            "market condition check passed",
            json!({"volume": volume, "spread_pct": spread_pct, "liquidity_score": liquidity}),
            at,
        ))
    }
}

/// Filter 3: reject when no support/resistance levels exist. Reads its
/// tunable thresholds from the ambient `FILTER_PARAMS` channel (§4.11),
/// falling back to compiled defaults for anything absent or malformed.
pub struct SupportResistanceFilter;

#[async_trait]
impl Filter for SupportResistanceFilter {
    fn name(&self) -> &'static str {
        "support_resistance"
    }

    fn weight(&self) -> FilterWeight {
        FilterWeight::Light
    }

    fn max_execution_time(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn execute(
        &self,
        data: &dyn PreparedData,
        _strategy: &StrategyParams,
        at: DateTime<Utc>,
    ) -> Result<FilterResult, AnalysisError> {
        let params = FilterParams::from_env().support_resistance();

        let supports = data.support_levels_at(at);
        let resistances = data.resistance_levels_at(at);

        if supports.is_empty() && resistances.is_empty() {
            return Ok(FilterResult::fail(
                "no support or resistance levels available",
                json!({"supports_count": 0, "resistances_count": 0}),
                at,
            ));
        }

        let strong_supports = supports
            .iter()
            .filter(|l| l.strength >= params.min_support_strength && l.touch_count >= params.min_touch_count)
            .count();
        let strong_resistances = resistances
            .iter()
            .filter(|l| l.strength >= params.min_resistance_strength && l.touch_count >= params.min_touch_count)
            .count();

        if strong_supports == 0 && strong_resistances == 0 {
            return Ok(FilterResult::fail(
                "no support or resistance levels meet strength/touch-count thresholds",
                json!({
                    "supports_count": supports.len(),
                    "resistances_count": resistances.len(),
                    "min_support_strength": params.min_support_strength,
                    "min_touch_count": params.min_touch_count,
                }),
                at,
            ));
        }

        Ok(FilterResult::pass(
            "support/resistance levels available",
            json!({"strong_supports": strong_supports, "strong_resistances": strong_resistances}),
            at,
        ))
    }
}
