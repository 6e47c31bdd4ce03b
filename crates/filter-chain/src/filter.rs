use crate::types::{FilterResult, FilterWeight, PreparedData, StrategyParams};
use analysis_core::AnalysisError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// One stage of the nine-stage chain (§4.5). `execute` returning `Err` is
/// translated by the chain into `FilterResult{passed:false, reason:"execution
/// error: ..."}` — filters never abort the whole evaluation run.
#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;
    fn weight(&self) -> FilterWeight;
    fn max_execution_time(&self) -> Duration;

    async fn execute(
        &self,
        data: &dyn PreparedData,
        strategy: &StrategyParams,
        at: DateTime<Utc>,
    ) -> Result<FilterResult, AnalysisError>;
}
