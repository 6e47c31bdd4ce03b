//! The Orchestrator (C7, spec §4.7): runs the six ordered stages for one
//! (symbol, timeframe, strategy) task, early-exiting per the state machine
//! and emitting Progress Store updates at stage boundaries.
//!
//! Grounded on the teacher's `AnalysisOrchestrator` — concurrent fan-out of
//! independent fetches via `tokio::join!`, `Option` + `tracing::warn!` for
//! graceful degradation — generalized here from "combine four analyzer
//! outputs" to "run six ordered stages with early exit."

pub mod result;

pub use result::{AnalysisResult, ErrorDetails, StageResult};

use analysis_core::{
    lookback_window, CustomPeriod, DataProvider, ErrorKind, ExitReason, Level, MarketContext,
    Prediction, SrOptions, Stage, Timeframe,
};
use chrono::{DateTime, Duration, Utc};
use progress_store::{
    FinalSignal, LeverageDecisionResult, LevelInfo, MarketContextResult, MlPredictionResult,
    ProgressStore, StageStatus, SupportResistanceResult,
};
use std::sync::Arc;
use std::time::Instant;

/// Minimum recommended leverage to accept a setup (§4.7) — a hard-coded
/// policy constant; strategy-level variability belongs in the Strategy
/// Catalog, never in code forks.
pub const MIN_LEVERAGE: f64 = 2.0;

/// Minimum leverage-recommendation confidence to accept a setup (§4.7).
pub const MIN_CONFIDENCE: f64 = 0.3;

/// Number of bars of standing lookback requested ahead of the evaluation
/// window, both in the default case and (via `lookback_window`) ahead of a
/// custom period's start (`high_leverage_bot_orchestrator.py`'s
/// `pre_period_minutes = 200 * timeframe_minutes` rule).
const DEFAULT_LOOKBACK_BARS: i64 = 200;

/// Synthetic BTC-shock magnitude used to size correlation risk (§6
/// `PredictBTCImpact`); a fixed scenario rather than a strategy parameter,
/// since the spec does not expose it as tunable.
const BTC_SHOCK_PCT: f64 = -10.0;

/// A reference to the strategy configuration driving one task — just the
/// fields the orchestrator itself consumes; the full configuration document
/// lives in the Strategy Catalog.
#[derive(Debug, Clone)]
pub struct StrategyRef {
    pub name: String,
    pub risk_tolerance: f64,
}

pub struct Orchestrator {
    data_provider: Arc<dyn DataProvider>,
    progress_store: Arc<ProgressStore>,
}

impl Orchestrator {
    pub fn new(data_provider: Arc<dyn DataProvider>, progress_store: Arc<ProgressStore>) -> Self {
        Self { data_provider, progress_store }
    }

    /// Run the six-stage state machine for one task. Always returns an
    /// `AnalysisResult` — every failure mode the state machine names is an
    /// early exit; unexpected Progress Store failures are logged (§5
    /// suspension points are non-fatal to the task) rather than aborting.
    pub async fn analyze(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        strategy: &StrategyRef,
        execution_id: &str,
        is_backtest: bool,
        target_timestamp: Option<DateTime<Utc>>,
        custom_period_settings: Option<CustomPeriod>,
    ) -> AnalysisResult {
        let mut result = AnalysisResult::new(symbol, timeframe.as_str(), &strategy.name, execution_id);

        if let Err(e) = self.progress_store.start_analysis(symbol, execution_id).await {
            tracing::warn!("progress store start_analysis failed for {}: {}", execution_id, e);
        }

        // Stage 1: data_fetch
        self.update_stage(execution_id, Stage::DataFetch).await;
        let started = Instant::now();
        let to = if is_backtest { target_timestamp.unwrap_or_else(Utc::now) } else { Utc::now() };
        let from = match &custom_period_settings {
            Some(period) => lookback_window(period, timeframe),
            None => to - Duration::minutes(DEFAULT_LOOKBACK_BARS * timeframe.to_minutes()),
        };

        let bars = match self.data_provider.fetch_ohlcv(symbol, timeframe, from, to).await {
            Ok(bars) if !bars.is_empty() => bars,
            Ok(_) => {
                result.record_stage(StageResult {
                    stage: Stage::DataFetch,
                    success: false,
                    execution_time_ms: elapsed_ms(started),
                    data_processed: Some(0),
                    items_found: None,
                    error_message: Some("no bars returned for requested window".to_string()),
                });
                return self.finish_early_exit(result, Stage::DataFetch, ExitReason::InsufficientData, execution_id, "no bars returned").await;
            }
            Err(e) => {
                result.record_stage(StageResult {
                    stage: Stage::DataFetch,
                    success: false,
                    execution_time_ms: elapsed_ms(started),
                    data_processed: None,
                    items_found: None,
                    error_message: Some(e.to_string()),
                });
                return self.finish_early_exit(result, Stage::DataFetch, ExitReason::InsufficientData, execution_id, &e.to_string()).await;
            }
        };
        result.total_data_points = Some(bars.len() as i64);
        result.record_stage(StageResult {
            stage: Stage::DataFetch,
            success: true,
            execution_time_ms: elapsed_ms(started),
            data_processed: Some(bars.len() as i64),
            items_found: None,
            error_message: None,
        });

        // Stage 2: support_resistance
        self.update_stage(execution_id, Stage::SupportResistance).await;
        let started = Instant::now();
        let sr_opts = SrOptions::default();
        let (supports, resistances) = match self.data_provider.detect_support_resistance(&bars, &sr_opts).await {
            Ok(levels) => levels,
            Err(e) => {
                self.update_support_resistance_failed(execution_id, &e.to_string()).await;
                result.record_stage(StageResult {
                    stage: Stage::SupportResistance,
                    success: false,
                    execution_time_ms: elapsed_ms(started),
                    data_processed: None,
                    items_found: None,
                    error_message: Some(e.to_string()),
                });
                return self.finish_early_exit(result, Stage::SupportResistance, ExitReason::NoSupportResistance, execution_id, &e.to_string()).await;
            }
        };

        if supports.is_empty() && resistances.is_empty() {
            self.update_support_resistance_failed(execution_id, "no levels detected").await;
            result.record_stage(StageResult {
                stage: Stage::SupportResistance,
                success: false,
                execution_time_ms: elapsed_ms(started),
                data_processed: Some(bars.len() as i64),
                items_found: Some(0),
                error_message: Some("no support or resistance levels detected".to_string()),
            });
            return self.finish_early_exit(result, Stage::SupportResistance, ExitReason::NoSupportResistance, execution_id, "no levels detected").await;
        }

        let sr_progress = SupportResistanceResult {
            status: StageStatus::Success,
            supports_count: supports.len() as u32,
            resistances_count: resistances.len() as u32,
            supports: supports.iter().map(level_info).collect(),
            resistances: resistances.iter().map(level_info).collect(),
            error_message: None,
        };
        if let Err(e) = self.progress_store.update_support_resistance(execution_id, sr_progress).await {
            tracing::warn!("progress store update_support_resistance failed for {}: {}", execution_id, e);
        }
        result.record_stage(StageResult {
            stage: Stage::SupportResistance,
            success: true,
            execution_time_ms: elapsed_ms(started),
            data_processed: Some(bars.len() as i64),
            items_found: Some((supports.len() + resistances.len()) as i64),
            error_message: None,
        });

        // Stage 3: ml_prediction — any per-level prediction error fails the whole stage.
        self.update_stage(execution_id, Stage::MlPrediction).await;
        let started = Instant::now();
        let all_levels: Vec<&Level> = supports.iter().chain(resistances.iter()).collect();
        let mut predictions: Vec<Prediction> = Vec::new();
        let mut ml_error: Option<String> = None;
        for level in &all_levels {
            match self.data_provider.predict_breakout(symbol, level).await {
                Ok(Some(prediction)) => predictions.push(prediction),
                Ok(None) => {}
                Err(e) => {
                    ml_error = Some(e.to_string());
                    break;
                }
            }
        }

        if let Some(message) = ml_error {
            let ml_progress = MlPredictionResult {
                status: StageStatus::Failed,
                predictions_count: predictions.len() as u32,
                confidence: 0.0,
                error_message: Some(message.clone()),
            };
            if let Err(e) = self.progress_store.update_ml_prediction(execution_id, ml_progress).await {
                tracing::warn!("progress store update_ml_prediction failed for {}: {}", execution_id, e);
            }
            result.record_stage(StageResult {
                stage: Stage::MlPrediction,
                success: false,
                execution_time_ms: elapsed_ms(started),
                data_processed: Some(all_levels.len() as i64),
                items_found: Some(predictions.len() as i64),
                error_message: Some(message.clone()),
            });
            return self.finish_early_exit(result, Stage::MlPrediction, ExitReason::MlPredictionFailed, execution_id, &message).await;
        }

        let avg_confidence = if predictions.is_empty() {
            0.0
        } else {
            predictions.iter().map(|p| p.confidence).sum::<f64>() / predictions.len() as f64
        };
        let ml_progress = MlPredictionResult {
            status: StageStatus::Success,
            predictions_count: predictions.len() as u32,
            confidence: avg_confidence,
            error_message: None,
        };
        if let Err(e) = self.progress_store.update_ml_prediction(execution_id, ml_progress).await {
            tracing::warn!("progress store update_ml_prediction failed for {}: {}", execution_id, e);
        }
        result.record_stage(StageResult {
            stage: Stage::MlPrediction,
            success: true,
            execution_time_ms: elapsed_ms(started),
            data_processed: Some(all_levels.len() as i64),
            items_found: Some(predictions.len() as i64),
            error_message: None,
        });

        // Stage 4: btc_correlation — both "data insufficient" and "network" errors are fatal.
        self.update_stage(execution_id, Stage::BtcCorrelation).await;
        let started = Instant::now();
        let correlation = match self.data_provider.predict_btc_impact(symbol, BTC_SHOCK_PCT).await {
            Ok(c) => c,
            Err(e) => {
                result.record_stage(StageResult {
                    stage: Stage::BtcCorrelation,
                    success: false,
                    execution_time_ms: elapsed_ms(started),
                    data_processed: None,
                    items_found: None,
                    error_message: Some(e.to_string()),
                });
                return self.finish_early_exit(result, Stage::BtcCorrelation, ExitReason::BtcDataInsufficient, execution_id, &e.to_string()).await;
            }
        };
        result.record_stage(StageResult {
            stage: Stage::BtcCorrelation,
            success: true,
            execution_time_ms: elapsed_ms(started),
            data_processed: Some(correlation.sample_size as i64),
            items_found: None,
            error_message: None,
        });

        // Stage 5: market_context
        self.update_stage(execution_id, Stage::MarketContext).await;
        let started = Instant::now();
        let market_ctx: MarketContext = match self.data_provider.analyze_market_phase(&bars, to).await {
            Ok(ctx) => ctx,
            Err(e) => {
                let ctx_progress = MarketContextResult {
                    status: Some(StageStatus::Failed),
                    trend_direction: None,
                    market_phase: None,
                    error_message: Some(e.to_string()),
                };
                if let Err(pe) = self.progress_store.update_market_context(execution_id, ctx_progress).await {
                    tracing::warn!("progress store update_market_context failed for {}: {}", execution_id, pe);
                }
                result.record_stage(StageResult {
                    stage: Stage::MarketContext,
                    success: false,
                    execution_time_ms: elapsed_ms(started),
                    data_processed: None,
                    items_found: None,
                    error_message: Some(e.to_string()),
                });
                return self.finish_early_exit(result, Stage::MarketContext, ExitReason::MarketContextFailed, execution_id, &e.to_string()).await;
            }
        };
        let ctx_progress = MarketContextResult {
            status: Some(StageStatus::Success),
            trend_direction: Some(market_ctx.trend_direction.clone()),
            market_phase: Some(market_ctx.market_phase.clone()),
            error_message: None,
        };
        if let Err(e) = self.progress_store.update_market_context(execution_id, ctx_progress).await {
            tracing::warn!("progress store update_market_context failed for {}: {}", execution_id, e);
        }
        result.record_stage(StageResult {
            stage: Stage::MarketContext,
            success: true,
            execution_time_ms: elapsed_ms(started),
            data_processed: None,
            items_found: None,
            error_message: None,
        });

        // Stage 6: leverage_decision
        self.update_stage(execution_id, Stage::LeverageDecision).await;
        let started = Instant::now();
        let levels = (supports, resistances);
        let recommendation = match self
            .data_provider
            .calculate_safe_leverage(&levels, &predictions, &market_ctx, strategy.risk_tolerance)
            .await
        {
            Ok(rec) => rec,
            Err(e) => {
                let dec_progress = LeverageDecisionResult {
                    status: Some(StageStatus::Failed),
                    recommended_leverage: None,
                    confidence_level: None,
                    risk_reward_ratio: None,
                    error_message: Some(e.to_string()),
                };
                if let Err(pe) = self.progress_store.update_leverage_decision(execution_id, dec_progress).await {
                    tracing::warn!("progress store update_leverage_decision failed for {}: {}", execution_id, pe);
                }
                result.record_stage(StageResult {
                    stage: Stage::LeverageDecision,
                    success: false,
                    execution_time_ms: elapsed_ms(started),
                    data_processed: None,
                    items_found: None,
                    error_message: Some(e.to_string()),
                });
                return self.finish_early_exit(result, Stage::LeverageDecision, ExitReason::LeverageConditionsNotMet, execution_id, &e.to_string()).await;
            }
        };

        let dec_progress = LeverageDecisionResult {
            status: Some(StageStatus::Success),
            recommended_leverage: Some(recommendation.recommended_leverage),
            confidence_level: Some(recommendation.confidence_level),
            risk_reward_ratio: Some(recommendation.risk_reward_ratio),
            error_message: None,
        };
        if let Err(e) = self.progress_store.update_leverage_decision(execution_id, dec_progress).await {
            tracing::warn!("progress store update_leverage_decision failed for {}: {}", execution_id, e);
        }

        if recommendation.recommended_leverage < MIN_LEVERAGE || recommendation.confidence_level < MIN_CONFIDENCE {
            let message = format!(
                "leverage {} or confidence {} below policy thresholds ({}, {})",
                recommendation.recommended_leverage, recommendation.confidence_level, MIN_LEVERAGE, MIN_CONFIDENCE
            );
            result.record_stage(StageResult {
                stage: Stage::LeverageDecision,
                success: false,
                execution_time_ms: elapsed_ms(started),
                data_processed: None,
                items_found: None,
                error_message: Some(message.clone()),
            });
            return self.finish_early_exit(result, Stage::LeverageDecision, ExitReason::LeverageConditionsNotMet, execution_id, &message).await;
        }

        result.record_stage(StageResult {
            stage: Stage::LeverageDecision,
            success: true,
            execution_time_ms: elapsed_ms(started),
            data_processed: None,
            items_found: None,
            error_message: None,
        });

        let recommendation_json = serde_json::json!({
            "recommended_leverage": recommendation.recommended_leverage,
            "confidence_level": recommendation.confidence_level,
            "risk_reward_ratio": recommendation.risk_reward_ratio,
            "max_loss_pct": recommendation.max_loss_pct,
            "correlation": correlation.correlation,
            "expected_btc_shock_impact_pct": correlation.expected_impact_pct,
            "trend_direction": market_ctx.trend_direction,
            "market_phase": market_ctx.market_phase,
        });

        if let Err(e) = self
            .progress_store
            .complete_analysis(execution_id, FinalSignal::SignalDetected, "leverage decision met policy thresholds")
            .await
        {
            tracing::warn!("progress store complete_analysis failed for {}: {}", execution_id, e);
        }

        result.into_completed(recommendation_json)
    }

    async fn update_stage(&self, execution_id: &str, stage: Stage) {
        if let Err(e) = self.progress_store.update_stage(execution_id, stage).await {
            tracing::warn!("progress store update_stage({:?}) failed for {}: {}", stage, execution_id, e);
        }
    }

    async fn update_support_resistance_failed(&self, execution_id: &str, message: &str) {
        let sr_progress = SupportResistanceResult {
            status: StageStatus::Failed,
            error_message: Some(message.to_string()),
            ..SupportResistanceResult::default()
        };
        if let Err(e) = self.progress_store.update_support_resistance(execution_id, sr_progress).await {
            tracing::warn!("progress store update_support_resistance failed for {}: {}", execution_id, e);
        }
    }

    async fn finish_early_exit(
        &self,
        result: AnalysisResult,
        stage: Stage,
        reason: ExitReason,
        execution_id: &str,
        message: &str,
    ) -> AnalysisResult {
        if let Err(e) = self.progress_store.fail_analysis(execution_id, stage, message).await {
            tracing::warn!("progress store fail_analysis failed for {}: {}", execution_id, e);
        }
        result.into_early_exit(stage, reason, message)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn level_info(level: &Level) -> LevelInfo {
    LevelInfo { price: level.price, strength: level.strength, touch_count: level.touch_count }
}

/// Convert an unexpected error into a task-error `AnalysisResult`, for
/// callers (the worker pool) that need to fold a non-early-exit failure
/// (e.g. a panic caught at the task boundary) into the same result shape.
pub fn task_error_result(
    symbol: &str,
    timeframe: Timeframe,
    strategy: &str,
    execution_id: &str,
    kind: ErrorKind,
    message: impl Into<String>,
) -> AnalysisResult {
    AnalysisResult::new(symbol, timeframe.as_str(), strategy, execution_id).into_error(kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{AnalysisError, Bar, CorrelationRisk, Direction, LeverageRecommendation};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Deterministic `DataProvider` stub whose per-stage behavior is
    /// configured per test, covering every early-exit branch in the state
    /// machine.
    struct StubProvider {
        bars: Vec<Bar>,
        supports: Vec<Level>,
        resistances: Vec<Level>,
        ml_fails: bool,
        btc_fails: bool,
        market_context_fails: bool,
        leverage: LeverageRecommendation,
        calls: Mutex<Vec<&'static str>>,
    }

    impl StubProvider {
        fn passing() -> Self {
            Self {
                bars: vec![Bar { timestamp: Utc::now(), open: 100.0, high: 101.0, low: 99.0, close: 100.5, volume: 1000.0, vwap: None }; 60],
                supports: vec![Level { price: 95.0, strength: 0.8, touch_count: 3 }],
                resistances: vec![Level { price: 105.0, strength: 0.8, touch_count: 3 }],
                ml_fails: false,
                btc_fails: false,
                market_context_fails: false,
                leverage: LeverageRecommendation {
                    recommended_leverage: 3.0,
                    confidence_level: 0.7,
                    risk_reward_ratio: 2.0,
                    max_loss_pct: 2.0,
                },
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DataProvider for StubProvider {
        async fn fetch_ohlcv(&self, _symbol: &str, _timeframe: Timeframe, _from: DateTime<Utc>, _to: DateTime<Utc>) -> Result<Vec<Bar>, AnalysisError> {
            self.calls.lock().unwrap().push("fetch_ohlcv");
            Ok(self.bars.clone())
        }

        async fn detect_support_resistance(&self, _bars: &[Bar], _opts: &SrOptions) -> Result<(Vec<Level>, Vec<Level>), AnalysisError> {
            self.calls.lock().unwrap().push("detect_support_resistance");
            Ok((self.supports.clone(), self.resistances.clone()))
        }

        async fn predict_breakout(&self, _symbol: &str, level: &Level) -> Result<Option<Prediction>, AnalysisError> {
            self.calls.lock().unwrap().push("predict_breakout");
            if self.ml_fails {
                return Err(AnalysisError::CalculationError("model unavailable".to_string()));
            }
            Ok(Some(Prediction { level_price: level.price, direction: Direction::Up, confidence: 0.75, strength: 0.6 }))
        }

        async fn predict_btc_impact(&self, _symbol: &str, _shock_pct: f64) -> Result<analysis_core::CorrelationRisk, AnalysisError> {
            self.calls.lock().unwrap().push("predict_btc_impact");
            if self.btc_fails {
                return Err(AnalysisError::InsufficientData("not enough BTC history".to_string()));
            }
            Ok(CorrelationRisk { correlation: 0.6, expected_impact_pct: -5.0, sample_size: 200 })
        }

        async fn analyze_market_phase(&self, _bars: &[Bar], _at: DateTime<Utc>) -> Result<MarketContext, AnalysisError> {
            self.calls.lock().unwrap().push("analyze_market_phase");
            if self.market_context_fails {
                return Err(AnalysisError::ApiError("benchmark feed unreachable".to_string()));
            }
            Ok(MarketContext { trend_direction: "up".to_string(), market_phase: "expansion".to_string(), volatility_percentile: 0.4 })
        }

        async fn calculate_safe_leverage(
            &self,
            _levels: &(Vec<Level>, Vec<Level>),
            _predictions: &[Prediction],
            _ctx: &MarketContext,
            _risk_tolerance: f64,
        ) -> Result<LeverageRecommendation, AnalysisError> {
            self.calls.lock().unwrap().push("calculate_safe_leverage");
            Ok(self.leverage.clone())
        }
    }

    fn strategy() -> StrategyRef {
        StrategyRef { name: "momentum".to_string(), risk_tolerance: 0.5 }
    }

    async fn orchestrator(provider: StubProvider) -> (Orchestrator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ProgressStore::new(dir.path()).unwrap());
        (Orchestrator::new(Arc::new(provider), store), dir)
    }

    #[tokio::test]
    async fn all_stages_pass_yields_a_completed_result_with_a_recommendation() {
        let (orchestrator, _dir) = orchestrator(StubProvider::passing()).await;
        let result = orchestrator
            .analyze("BTC", Timeframe::Hour1, &strategy(), "exec-ok", false, None, None)
            .await;

        assert!(result.completed);
        assert!(!result.early_exit);
        assert!(result.recommendation.is_some());
        assert_eq!(result.stage_results.len(), 6);
        assert!(result.stage_results.iter().all(|s| s.success));
    }

    #[tokio::test]
    async fn empty_bars_early_exits_at_data_fetch() {
        let mut provider = StubProvider::passing();
        provider.bars = Vec::new();
        let (orchestrator, _dir) = orchestrator(provider).await;

        let result = orchestrator
            .analyze("BTC", Timeframe::Hour1, &strategy(), "exec-empty", false, None, None)
            .await;

        assert!(result.early_exit);
        assert_eq!(result.exit_stage, Some(Stage::DataFetch));
        assert_eq!(result.exit_reason, Some(ExitReason::InsufficientData));
        assert_eq!(result.stage_results.len(), 1);
    }

    #[tokio::test]
    async fn no_levels_early_exits_at_support_resistance() {
        let mut provider = StubProvider::passing();
        provider.supports = Vec::new();
        provider.resistances = Vec::new();
        let (orchestrator, _dir) = orchestrator(provider).await;

        let result = orchestrator
            .analyze("BTC", Timeframe::Hour1, &strategy(), "exec-no-levels", false, None, None)
            .await;

        assert!(result.early_exit);
        assert_eq!(result.exit_stage, Some(Stage::SupportResistance));
        assert_eq!(result.exit_reason, Some(ExitReason::NoSupportResistance));
    }

    #[tokio::test]
    async fn a_single_failed_prediction_fails_the_whole_ml_stage() {
        let mut provider = StubProvider::passing();
        provider.ml_fails = true;
        let (orchestrator, _dir) = orchestrator(provider).await;

        let result = orchestrator
            .analyze("BTC", Timeframe::Hour1, &strategy(), "exec-ml-fail", false, None, None)
            .await;

        assert!(result.early_exit);
        assert_eq!(result.exit_stage, Some(Stage::MlPrediction));
        assert_eq!(result.exit_reason, Some(ExitReason::MlPredictionFailed));
    }

    #[tokio::test]
    async fn btc_correlation_failure_is_fatal() {
        let mut provider = StubProvider::passing();
        provider.btc_fails = true;
        let (orchestrator, _dir) = orchestrator(provider).await;

        let result = orchestrator
            .analyze("BTC", Timeframe::Hour1, &strategy(), "exec-btc-fail", false, None, None)
            .await;

        assert!(result.early_exit);
        assert_eq!(result.exit_stage, Some(Stage::BtcCorrelation));
        assert_eq!(result.exit_reason, Some(ExitReason::BtcDataInsufficient));
    }

    #[tokio::test]
    async fn market_context_failure_early_exits() {
        let mut provider = StubProvider::passing();
        provider.market_context_fails = true;
        let (orchestrator, _dir) = orchestrator(provider).await;

        let result = orchestrator
            .analyze("BTC", Timeframe::Hour1, &strategy(), "exec-ctx-fail", false, None, None)
            .await;

        assert!(result.early_exit);
        assert_eq!(result.exit_stage, Some(Stage::MarketContext));
        assert_eq!(result.exit_reason, Some(ExitReason::MarketContextFailed));
    }

    #[tokio::test]
    async fn leverage_below_threshold_early_exits_even_though_the_call_succeeds() {
        let mut provider = StubProvider::passing();
        provider.leverage.recommended_leverage = 1.2; // below MIN_LEVERAGE
        let (orchestrator, _dir) = orchestrator(provider).await;

        let result = orchestrator
            .analyze("BTC", Timeframe::Hour1, &strategy(), "exec-low-leverage", false, None, None)
            .await;

        assert!(result.early_exit);
        assert_eq!(result.exit_stage, Some(Stage::LeverageDecision));
        assert_eq!(result.exit_reason, Some(ExitReason::LeverageConditionsNotMet));
    }

    #[tokio::test]
    async fn low_confidence_leverage_also_early_exits() {
        let mut provider = StubProvider::passing();
        provider.leverage.confidence_level = 0.1; // below MIN_CONFIDENCE
        let (orchestrator, _dir) = orchestrator(provider).await;

        let result = orchestrator
            .analyze("BTC", Timeframe::Hour1, &strategy(), "exec-low-confidence", false, None, None)
            .await;

        assert!(result.early_exit);
        assert_eq!(result.exit_reason, Some(ExitReason::LeverageConditionsNotMet));
    }

    #[tokio::test]
    async fn custom_period_widens_the_fetch_window_via_lookback() {
        let (orchestrator, _dir) = orchestrator(StubProvider::passing()).await;
        let period = CustomPeriod { start: Utc::now() - Duration::days(5), end: Utc::now() };

        let result = orchestrator
            .analyze("BTC", Timeframe::Hour1, &strategy(), "exec-backtest", true, Some(period.end), Some(period))
            .await;

        assert!(result.completed || result.early_exit);
    }

    #[tokio::test]
    async fn stage_order_is_a_prefix_of_the_canonical_sequence() {
        let (orchestrator, _dir) = orchestrator(StubProvider::passing()).await;
        let result = orchestrator
            .analyze("BTC", Timeframe::Hour1, &strategy(), "exec-order", false, None, None)
            .await;

        let stages: Vec<Stage> = result.stage_results.iter().map(|s| s.stage).collect();
        assert_eq!(stages, Stage::ORDER.to_vec());
    }
}
