use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    AnalysisError, Bar, CorrelationRisk, CustomPeriod, Level, LeverageRecommendation,
    MarketContext, Prediction, Timeframe,
};

/// The external data-provider boundary (§6). Real implementations (exchange
/// connectivity, trained ML models, the leverage-math engine) are out of
/// scope for this core; the orchestrator and filter chain depend only on
/// this trait, so any conforming implementation can be substituted.
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, AnalysisError>;

    async fn detect_support_resistance(
        &self,
        bars: &[Bar],
        opts: &SrOptions,
    ) -> Result<(Vec<Level>, Vec<Level>), AnalysisError>;

    async fn predict_breakout(
        &self,
        symbol: &str,
        level: &Level,
    ) -> Result<Option<Prediction>, AnalysisError>;

    async fn predict_btc_impact(
        &self,
        symbol: &str,
        shock_pct: f64,
    ) -> Result<CorrelationRisk, AnalysisError>;

    async fn analyze_market_phase(
        &self,
        bars: &[Bar],
        at: DateTime<Utc>,
    ) -> Result<MarketContext, AnalysisError>;

    async fn calculate_safe_leverage(
        &self,
        levels: &(Vec<Level>, Vec<Level>),
        predictions: &[Prediction],
        ctx: &MarketContext,
        risk_tolerance: f64,
    ) -> Result<LeverageRecommendation, AnalysisError>;
}

/// Tunable parameters threaded into support/resistance detection (§4.11).
#[derive(Debug, Clone)]
pub struct SrOptions {
    pub min_support_strength: f64,
    pub min_resistance_strength: f64,
    pub min_touch_count: u32,
    pub max_distance_pct: f64,
    pub tolerance_pct: f64,
    pub fractal_window: u32,
}

impl Default for SrOptions {
    fn default() -> Self {
        Self {
            min_support_strength: 0.5,
            min_resistance_strength: 0.5,
            min_touch_count: 2,
            max_distance_pct: 0.10,
            tolerance_pct: 0.02,
            fractal_window: 5,
        }
    }
}

/// Lookback-window adjustment for custom-period (backtest-mode) analysis,
/// derived from the original's `200 * timeframe_minutes` pre-period rule
/// (`high_leverage_bot_orchestrator.py`).
pub fn lookback_window(period: &CustomPeriod, timeframe: Timeframe) -> DateTime<Utc> {
    let pre_period_minutes = 200 * timeframe.to_minutes();
    period.start - chrono::Duration::minutes(pre_period_minutes)
}

/// The leverage-math external collaborator (filter chain's Filter 7, §4.5).
/// Real implementations sit outside this workspace; `filter-chain` ships a
/// deterministic stub behind this trait for testing (see REDESIGN FLAGS).
#[async_trait]
pub trait LeverageEngine: Send + Sync {
    async fn optimal_leverage(
        &self,
        symbol: &str,
        price: f64,
        volatility: f64,
    ) -> Result<LeverageRecommendation, AnalysisError>;
}

/// The ML-prediction external collaborator (filter chain's Filters 5/9,
/// §4.5). Same out-of-scope boundary as `LeverageEngine`.
#[async_trait]
pub trait MlPredictor: Send + Sync {
    async fn confidence_for(&self, symbol: &str, at: DateTime<Utc>) -> Result<Prediction, AnalysisError>;
}
