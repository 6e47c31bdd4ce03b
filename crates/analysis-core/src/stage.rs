use serde::{Deserialize, Serialize};

/// The Orchestrator's six ordered stages plus the two terminal markers the
/// Progress Store tracks (§4.7, §3 Progress Record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initializing,
    DataFetch,
    SupportResistance,
    MlPrediction,
    BtcCorrelation,
    MarketContext,
    LeverageDecision,
    Completed,
    Failed,
}

impl Stage {
    /// The canonical stage order an Analysis Result's stage trace must be a prefix of.
    pub const ORDER: [Stage; 6] = [
        Stage::DataFetch,
        Stage::SupportResistance,
        Stage::MlPrediction,
        Stage::BtcCorrelation,
        Stage::MarketContext,
        Stage::LeverageDecision,
    ];

    pub fn index(&self) -> Option<usize> {
        Self::ORDER.iter().position(|s| s == self)
    }
}

/// Why a task ended before reaching the final stage — an expected, data-driven
/// outcome, not a fault (§3 Analysis Result, §7 taxonomy kind 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    NoSupportResistance,
    InsufficientData,
    MlPredictionFailed,
    BtcDataInsufficient,
    MarketContextFailed,
    LeverageConditionsNotMet,
    DataQualityPoor,
    ExecutionError,
}

impl ExitReason {
    /// Snake-case code stored in `error_message` columns (§4.8 step 8, S2) —
    /// matches this type's own `#[serde(rename_all = "snake_case")]` wire
    /// form, e.g. `NoSupportResistance` -> `"no_support_resistance"`.
    pub fn code(&self) -> &'static str {
        match self {
            ExitReason::NoSupportResistance => "no_support_resistance",
            ExitReason::InsufficientData => "insufficient_data",
            ExitReason::MlPredictionFailed => "ml_prediction_failed",
            ExitReason::BtcDataInsufficient => "btc_data_insufficient",
            ExitReason::MarketContextFailed => "market_context_failed",
            ExitReason::LeverageConditionsNotMet => "leverage_conditions_not_met",
            ExitReason::DataQualityPoor => "data_quality_poor",
            ExitReason::ExecutionError => "execution_error",
        }
    }

    /// Static remediation hints, used by the Notifier and the dashboard (§4.6).
    pub fn suggestion(&self) -> &'static str {
        match self {
            ExitReason::NoSupportResistance => {
                "try a longer lookback window or a lower timeframe to surface more S/R touches"
            }
            ExitReason::InsufficientData => {
                "the symbol may be newly listed; try a shorter lookback window"
            }
            ExitReason::MlPredictionFailed => {
                "check the ML service health; every level's prediction must succeed"
            }
            ExitReason::BtcDataInsufficient => {
                "BTC correlation requires a full comparison window; retry once BTC data backfills"
            }
            ExitReason::MarketContextFailed => {
                "market-phase detection failed; verify the benchmark feed is reachable"
            }
            ExitReason::LeverageConditionsNotMet => {
                "recommended leverage or confidence fell below policy thresholds for this setup"
            }
            ExitReason::DataQualityPoor => {
                "input data failed quality checks; inspect for gaps or price anomalies"
            }
            ExitReason::ExecutionError => "an unexpected error interrupted the task; see error_details",
        }
    }
}

/// Exit stage recorded alongside an `ExitReason` (§3 Analysis Result).
pub type ExitStage = Stage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_matches_canonical_sequence() {
        assert_eq!(Stage::ORDER[0], Stage::DataFetch);
        assert_eq!(Stage::ORDER[5], Stage::LeverageDecision);
        assert_eq!(Stage::DataFetch.index(), Some(0));
        assert_eq!(Stage::Completed.index(), None);
    }

    #[test]
    fn every_exit_reason_has_a_suggestion() {
        let reasons = [
            ExitReason::NoSupportResistance,
            ExitReason::InsufficientData,
            ExitReason::MlPredictionFailed,
            ExitReason::BtcDataInsufficient,
            ExitReason::MarketContextFailed,
            ExitReason::LeverageConditionsNotMet,
            ExitReason::DataQualityPoor,
            ExitReason::ExecutionError,
        ];
        for r in reasons {
            assert!(!r.suggestion().is_empty());
        }
    }

    #[test]
    fn code_matches_the_serde_snake_case_wire_form() {
        let json = serde_json::to_string(&ExitReason::NoSupportResistance).unwrap();
        assert_eq!(json, format!("\"{}\"", ExitReason::NoSupportResistance.code()));
    }
}
