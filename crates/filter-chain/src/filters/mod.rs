pub mod heavy;
pub mod light;
pub mod medium;
pub mod stubs;

pub use heavy::{LeverageFilter, RiskRewardFilter, StrategySpecificFilter};
pub use light::{DataQualityFilter, MarketConditionFilter, SupportResistanceFilter};
pub use medium::{DistanceAnalysisFilter, MlConfidenceFilter, VolatilityFilter};
pub use stubs::{StubLeverageEngine, StubMlPredictor};
