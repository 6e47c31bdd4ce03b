//! A deterministic stand-in for the out-of-scope market-data/ML/leverage
//! collaborators (§1, §6). No exchange connectivity exists in this
//! workspace, so `fetch_ohlcv` — the one call every task makes first —
//! always fails, which the Orchestrator already treats as a legitimate
//! `insufficient_data` early exit rather than a crash. The remaining
//! methods stay implemented and deterministic (reusing `filter-chain`'s
//! stub leverage/ML engines) so the boundary is exercisable end to end the
//! moment a real fetch path is swapped in.

use analysis_core::{
    Bar, CorrelationRisk, DataProvider, Level, LeverageRecommendation, MarketContext, Prediction,
    SrOptions, Timeframe,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filter_chain::{StubLeverageEngine, StubMlPredictor};

pub struct StubDataProvider {
    leverage_engine: StubLeverageEngine,
    ml_predictor: StubMlPredictor,
}

impl StubDataProvider {
    pub fn new() -> Self {
        tracing::warn!(
            "no market-data provider is configured; every dispatched task will early-exit at data_fetch \
             until a production DataProvider is wired in"
        );
        Self { leverage_engine: StubLeverageEngine::new(), ml_predictor: StubMlPredictor::new() }
    }
}

impl Default for StubDataProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataProvider for StubDataProvider {
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, analysis_core::AnalysisError> {
        Err(analysis_core::AnalysisError::ApiError(format!(
            "no market-data provider configured for {symbol}"
        )))
    }

    async fn detect_support_resistance(
        &self,
        _bars: &[Bar],
        _opts: &SrOptions,
    ) -> Result<(Vec<Level>, Vec<Level>), analysis_core::AnalysisError> {
        Ok((Vec::new(), Vec::new()))
    }

    async fn predict_breakout(
        &self,
        symbol: &str,
        level: &Level,
    ) -> Result<Option<Prediction>, analysis_core::AnalysisError> {
        let prediction = self.ml_predictor.confidence_for(symbol, Utc::now()).await?;
        Ok(Some(Prediction { level_price: level.price, ..prediction }))
    }

    async fn predict_btc_impact(
        &self,
        _symbol: &str,
        _shock_pct: f64,
    ) -> Result<CorrelationRisk, analysis_core::AnalysisError> {
        Ok(CorrelationRisk { correlation: 0.0, expected_impact_pct: 0.0, sample_size: 0 })
    }

    async fn analyze_market_phase(
        &self,
        _bars: &[Bar],
        _at: DateTime<Utc>,
    ) -> Result<MarketContext, analysis_core::AnalysisError> {
        Ok(MarketContext {
            trend_direction: "unknown".to_string(),
            market_phase: "unknown".to_string(),
            volatility_percentile: 0.5,
        })
    }

    async fn calculate_safe_leverage(
        &self,
        levels: &(Vec<Level>, Vec<Level>),
        _predictions: &[Prediction],
        ctx: &MarketContext,
        _risk_tolerance: f64,
    ) -> Result<LeverageRecommendation, analysis_core::AnalysisError> {
        let reference_price = levels.0.first().or(levels.1.first()).map(|l| l.price).unwrap_or(0.0);
        self.leverage_engine.optimal_leverage("", reference_price, ctx.volatility_percentile).await
    }
}
