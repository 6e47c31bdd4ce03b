//! The nine-stage early-exit filter chain (C5, spec §4.5), grounded on
//! `original_source/engines/filtering_framework.py`.

pub mod filter;
pub mod filters;
pub mod statistics;
pub mod types;

pub use filter::Filter;
pub use filters::*;
pub use statistics::{FilterStats, Statistics, FILTER_COUNT};
pub use types::*;

use analysis_core::Direction;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Instant;

/// Drives the fixed nine-filter chain over a set of evaluation points,
/// stopping at the first failure per point and tracking running statistics.
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
    statistics: Statistics,
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        debug_assert_eq!(filters.len(), FILTER_COUNT, "filter chain must have exactly nine stages");
        Self { filters, statistics: Statistics::default() }
    }

    /// Build the chain with the standard filter ordering and the given
    /// external-collaborator implementations (real or stub).
    pub fn standard(
        leverage_engine: std::sync::Arc<dyn analysis_core::LeverageEngine>,
        predictor: std::sync::Arc<dyn analysis_core::MlPredictor>,
    ) -> Self {
        Self::new(vec![
            Box::new(DataQualityFilter),
            Box::new(MarketConditionFilter),
            Box::new(SupportResistanceFilter),
            Box::new(DistanceAnalysisFilter),
            Box::new(MlConfidenceFilter),
            Box::new(VolatilityFilter),
            Box::new(LeverageFilter { engine: leverage_engine.clone() }),
            Box::new(RiskRewardFilter { engine: leverage_engine }),
            Box::new(StrategySpecificFilter { predictor }),
        ])
    }

    pub async fn execute_filtering(
        &mut self,
        data: &dyn PreparedData,
        strategy: &StrategyParams,
        evaluation_times: &[DateTime<Utc>],
    ) -> Vec<ValidTrade> {
        let start = Instant::now();
        self.statistics.total_evaluations = evaluation_times.len() as u64;

        let mut trades = Vec::new();
        for (idx, &at) in evaluation_times.iter().enumerate() {
            if let Some(trade) = self.run_chain_for(data, strategy, at).await {
                trades.push(trade);
            }
            if idx % 100 == 0 || idx == evaluation_times.len().saturating_sub(1) {
                tracing::info!("filter chain progress: {}/{} evaluated, {} valid so far", idx + 1, evaluation_times.len(), trades.len());
            }
        }

        self.statistics.valid_trades = trades.len() as u64;
        self.statistics.execution_time = start.elapsed();
        trades
    }

    async fn run_chain_for(
        &mut self,
        data: &dyn PreparedData,
        strategy: &StrategyParams,
        at: DateTime<Utc>,
    ) -> Option<ValidTrade> {
        let mut results: Vec<FilterResult> = Vec::with_capacity(FILTER_COUNT);

        for (i, filter) in self.filters.iter().enumerate() {
            let started = Instant::now();
            let result = match filter.execute(data, strategy, at).await {
                Ok(r) => r,
                Err(e) => FilterResult::execution_error(e, at),
            };
            let elapsed = started.elapsed();
            if elapsed > filter.max_execution_time() {
                tracing::warn!(
                    "filter {} ({}) exceeded max execution time: {:?} > {:?}",
                    i + 1,
                    filter.name(),
                    elapsed,
                    filter.max_execution_time()
                );
            }

            self.statistics.per_filter[i].record(result.passed);
            if !result.passed {
                self.statistics.record_exclusion(i);
                return None;
            }
            results.push(result);
        }

        build_trade(data, strategy, at, &results)
    }

    pub fn get_statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn reset_statistics(&mut self) {
        self.statistics = Statistics::default();
    }
}

/// A trade object is constructed only when all nine filters pass; leverage
/// and risk:reward figures are read back from the metrics the leverage (7)
/// and risk_reward (8) filters already computed, rather than recomputed.
fn build_trade(
    data: &dyn PreparedData,
    strategy: &StrategyParams,
    at: DateTime<Utc>,
    results: &[FilterResult],
) -> Option<ValidTrade> {
    let leverage_metrics = &results.get(6)?.metrics;
    let risk_reward_metrics = &results.get(7)?.metrics;

    let leverage = get_f64(leverage_metrics, "leverage")?;
    let confidence = get_f64(leverage_metrics, "confidence")?;
    let max_loss_pct = get_f64(leverage_metrics, "max_loss_pct").unwrap_or(1.0);
    let risk_reward = get_f64(risk_reward_metrics, "risk_reward")?;

    let entry_price = data.price_at(at)?;
    let direction = data.prediction_at(at).map(|p| p.direction).unwrap_or(Direction::Up);

    let downside_risk = max_loss_pct * leverage;
    let profit_potential = downside_risk * risk_reward;

    Some(ValidTrade {
        entry_time: at,
        entry_price,
        strategy_name: strategy.name.clone(),
        leverage,
        profit_potential,
        downside_risk,
        risk_reward,
        confidence,
        direction,
    })
}

fn get_f64(metrics: &Value, key: &str) -> Option<f64> {
    metrics.get(key).and_then(Value::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{Level, Prediction};
    use chrono::Duration;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Deterministic `PreparedData` stub: globally valid market data, with
    /// per-evaluation-point overrides for missing-data and support/resistance
    /// availability so chain accounting tests (S4) can target exact filters.
    struct TestData {
        missing_data_at: HashSet<usize>,
        no_levels_at: HashSet<usize>,
        epoch: DateTime<Utc>,
    }

    impl TestData {
        fn index_of(&self, at: DateTime<Utc>) -> usize {
            (at - self.epoch).num_seconds() as usize
        }

        fn time_for(&self, idx: usize) -> DateTime<Utc> {
            self.epoch + Duration::seconds(idx as i64)
        }
    }

    impl PreparedData for TestData {
        fn symbol(&self) -> &str {
            "BTC"
        }

        fn price_at(&self, _at: DateTime<Utc>) -> Option<f64> {
            Some(100.0)
        }

        fn volume_at(&self, _at: DateTime<Utc>) -> Option<f64> {
            Some(10_000.0)
        }

        fn spread_pct_at(&self, _at: DateTime<Utc>) -> Option<f64> {
            Some(0.05)
        }

        fn liquidity_score_at(&self, _at: DateTime<Utc>) -> Option<f64> {
            Some(0.8)
        }

        fn has_missing_data_around(&self, at: DateTime<Utc>) -> bool {
            self.missing_data_at.contains(&self.index_of(at))
        }

        fn has_price_anomaly_at(&self, _at: DateTime<Utc>) -> bool {
            false
        }

        fn is_valid(&self) -> bool {
            true
        }

        fn volatility(&self) -> f64 {
            0.02
        }

        fn atr_price_ratio(&self) -> f64 {
            0.01
        }

        fn stability_score(&self) -> f64 {
            0.8
        }

        fn support_levels_at(&self, at: DateTime<Utc>) -> Vec<Level> {
            if self.no_levels_at.contains(&self.index_of(at)) {
                Vec::new()
            } else {
                vec![Level { price: 97.0, strength: 0.9, touch_count: 4 }]
            }
        }

        fn resistance_levels_at(&self, at: DateTime<Utc>) -> Vec<Level> {
            if self.no_levels_at.contains(&self.index_of(at)) {
                Vec::new()
            } else {
                vec![Level { price: 104.0, strength: 0.9, touch_count: 4 }]
            }
        }

        fn prediction_at(&self, _at: DateTime<Utc>) -> Option<Prediction> {
            Some(Prediction {
                level_price: 104.0,
                direction: Direction::Up,
                confidence: 0.8,
                strength: 0.7,
            })
        }
    }

    fn chain() -> FilterChain {
        FilterChain::standard(
            Arc::new(filters::stubs::StubLeverageEngine::new()),
            Arc::new(filters::stubs::StubMlPredictor::new()),
        )
    }

    #[tokio::test]
    async fn all_pass_produces_a_trade_with_metrics_from_filters_seven_and_eight() {
        let mut chain = chain();
        let data = TestData { missing_data_at: HashSet::new(), no_levels_at: HashSet::new(), epoch: Utc::now() };
        let strategy = StrategyParams::default();
        let times = vec![data.time_for(0)];

        let trades = chain.execute_filtering(&data, &strategy, &times).await;
        assert_eq!(trades.len(), 1);
        assert!(trades[0].leverage > 0.0);
        assert!(trades[0].risk_reward > 0.0);

        let stats = chain.get_statistics();
        assert_eq!(stats.total_evaluations, 1);
        assert_eq!(stats.valid_trades, 1);
        assert_eq!(stats.per_filter_exclusions, [0; FILTER_COUNT]);
    }

    /// Scenario S4: 100 points, filter 1 rejects 30, filter 3 rejects 20 of
    /// the 70 survivors, remaining 50 pass all nine.
    #[tokio::test]
    async fn scenario_s4_filter_chain_accounting() {
        let epoch = Utc::now();
        let missing_data_at: HashSet<usize> = (0..30).collect();
        // Of the 70 survivors (indices 30..100), the first 20 lack S/R levels.
        let no_levels_at: HashSet<usize> = (30..50).collect();

        let data = TestData { missing_data_at, no_levels_at, epoch };
        let strategy = StrategyParams::default();
        let times: Vec<_> = (0..100).map(|i| data.time_for(i)).collect();

        let mut chain = chain();
        let trades = chain.execute_filtering(&data, &strategy, &times).await;

        let stats = chain.get_statistics();
        assert_eq!(stats.total_evaluations, 100);
        assert_eq!(trades.len(), 50);
        assert_eq!(stats.valid_trades, 50);
        assert_eq!(stats.pass_rate(), 0.5);

        let mut expected = [0u32; FILTER_COUNT];
        expected[0] = 30; // filter 1: data_quality
        expected[2] = 20; // filter 3: support_resistance
        assert_eq!(stats.per_filter_exclusions, expected);
    }

    #[tokio::test]
    async fn reset_statistics_clears_all_counters() {
        let epoch = Utc::now();
        let data = TestData { missing_data_at: HashSet::new(), no_levels_at: HashSet::new(), epoch };
        let strategy = StrategyParams::default();
        let times = vec![data.time_for(0)];

        let mut chain = chain();
        chain.execute_filtering(&data, &strategy, &times).await;
        assert!(chain.get_statistics().total_evaluations > 0);

        chain.reset_statistics();
        let stats = chain.get_statistics();
        assert_eq!(stats.total_evaluations, 0);
        assert_eq!(stats.valid_trades, 0);
        assert_eq!(stats.per_filter_exclusions, [0; FILTER_COUNT]);
    }

    #[tokio::test]
    async fn filter_one_failure_stops_the_chain_before_later_filters_run() {
        let epoch = Utc::now();
        let missing_data_at: HashSet<usize> = [0].into_iter().collect();
        let data = TestData { missing_data_at, no_levels_at: HashSet::new(), epoch };
        let strategy = StrategyParams::default();
        let times = vec![data.time_for(0)];

        let mut chain = chain();
        let trades = chain.execute_filtering(&data, &strategy, &times).await;
        assert!(trades.is_empty());

        let stats = chain.get_statistics();
        // only filter 1 ran
        assert_eq!(stats.per_filter[0].execution_count, 1);
        assert_eq!(stats.per_filter[1].execution_count, 0);
    }
}

// Property tests (invariant 3, §8): total_evaluations = valid_trades + Σ per_filter_exclusions.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn invariant_total_equals_valid_plus_exclusions(
            valid_trades in 0u64..1000,
            exclusions in proptest::collection::vec(0u32..50, FILTER_COUNT),
        ) {
            let mut stats = Statistics::default();
            stats.valid_trades = valid_trades;
            for (i, count) in exclusions.iter().enumerate() {
                stats.per_filter_exclusions[i] = *count;
            }
            stats.total_evaluations = valid_trades + exclusions.iter().map(|c| *c as u64).sum::<u64>();

            let sum_exclusions: u64 = stats.per_filter_exclusions.iter().map(|c| *c as u64).sum();
            prop_assert_eq!(stats.total_evaluations, stats.valid_trades + sum_exclusions);
        }
    }
}
