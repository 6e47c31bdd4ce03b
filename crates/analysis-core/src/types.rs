use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar data, the unit the data-provider boundary (§6) exchanges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub vwap: Option<f64>,
}

/// Timeframe an analysis task runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "30m")]
    Minute30,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
}

impl Timeframe {
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::Minute1 => 1,
            Timeframe::Minute5 => 5,
            Timeframe::Minute15 => 15,
            Timeframe::Minute30 => 30,
            Timeframe::Hour1 => 60,
            Timeframe::Hour4 => 240,
            Timeframe::Day1 => 1440,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Minute1 => "1m",
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Minute30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Timeframe::Minute1),
            "5m" => Some(Timeframe::Minute5),
            "15m" => Some(Timeframe::Minute15),
            "30m" => Some(Timeframe::Minute30),
            "1h" => Some(Timeframe::Hour1),
            "4h" => Some(Timeframe::Hour4),
            "1d" => Some(Timeframe::Day1),
            _ => None,
        }
    }
}

/// A detected support or resistance level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub strength: f64,
    pub touch_count: u32,
}

/// Direction of a support/resistance breakout prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

/// ML breakout prediction for a single level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub level_price: f64,
    pub direction: Direction,
    pub confidence: f64,
    pub strength: f64,
}

/// BTC correlation / shock-propagation risk for an altcoin symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRisk {
    pub correlation: f64,
    pub expected_impact_pct: f64,
    pub sample_size: usize,
}

/// Broader market phase/trend context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketContext {
    pub trend_direction: String,
    pub market_phase: String,
    pub volatility_percentile: f64,
}

/// Leverage recommendation produced by the (external) leverage-math engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageRecommendation {
    pub recommended_leverage: f64,
    pub confidence_level: f64,
    pub risk_reward_ratio: f64,
    pub max_loss_pct: f64,
}

/// A custom period override for backtest-mode analysis (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}
