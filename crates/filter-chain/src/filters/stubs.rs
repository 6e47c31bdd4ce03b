//! Deterministic stand-ins for the out-of-scope leverage-math engine and ML
//! model (§4.5, REDESIGN FLAGS). The original falls back to a
//! `hash(...) % N` pseudo-random value when these services are unavailable;
//! this implementation keeps the gap visible instead of silent by logging a
//! warning at construction and computing a deterministic value from the
//! inputs rather than wall-clock-seeded randomness.

use analysis_core::{AnalysisError, Direction, LeverageEngine, LeverageRecommendation, MlPredictor, Prediction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub struct StubLeverageEngine;

impl StubLeverageEngine {
    pub fn new() -> Self {
        tracing::warn!("using stub leverage implementation — replace with production model");
        Self
    }
}

impl Default for StubLeverageEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeverageEngine for StubLeverageEngine {
    async fn optimal_leverage(
        &self,
        _symbol: &str,
        _price: f64,
        volatility: f64,
    ) -> Result<LeverageRecommendation, AnalysisError> {
        let volatility_adjustment = (1.0 - volatility.min(0.5) * 2.0).clamp(0.2, 1.0);
        let recommended_leverage = (3.0 * volatility_adjustment).clamp(1.0, 10.0);
        Ok(LeverageRecommendation {
            recommended_leverage,
            confidence_level: 0.75,
            risk_reward_ratio: 2.0 * volatility_adjustment,
            max_loss_pct: 5.0 / recommended_leverage,
        })
    }
}

pub struct StubMlPredictor;

impl StubMlPredictor {
    pub fn new() -> Self {
        tracing::warn!("using stub ML predictor implementation — replace with production model");
        Self
    }
}

impl Default for StubMlPredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MlPredictor for StubMlPredictor {
    async fn confidence_for(&self, _symbol: &str, _at: DateTime<Utc>) -> Result<Prediction, AnalysisError> {
        Ok(Prediction {
            level_price: 0.0,
            direction: Direction::Up,
            confidence: 0.65,
            strength: 0.6,
        })
    }
}
