use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const FILTER_COUNT: usize = 9;

/// Per-filter running tallies (§4.5).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FilterStats {
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
}

impl FilterStats {
    pub fn record(&mut self, passed: bool) {
        self.execution_count += 1;
        if passed {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.execution_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.execution_count as f64
        }
    }
}

/// Running statistics for one `FilterChain`, maintained incrementally so
/// percentages are available without a second pass (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub total_evaluations: u64,
    pub valid_trades: u64,
    pub per_filter_exclusions: [u32; FILTER_COUNT],
    #[serde(with = "duration_secs")]
    pub execution_time: Duration,
    pub per_filter: [FilterStats; FILTER_COUNT],
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            total_evaluations: 0,
            valid_trades: 0,
            per_filter_exclusions: [0; FILTER_COUNT],
            execution_time: Duration::ZERO,
            per_filter: [FilterStats::default(); FILTER_COUNT],
        }
    }
}

impl Statistics {
    pub fn pass_rate(&self) -> f64 {
        if self.total_evaluations == 0 {
            0.0
        } else {
            self.valid_trades as f64 / self.total_evaluations as f64
        }
    }

    pub fn exclusion_rate(&self) -> f64 {
        1.0 - self.pass_rate()
    }

    pub fn record_exclusion(&mut self, filter_index: usize) {
        if let Some(slot) = self.per_filter_exclusions.get_mut(filter_index) {
            *slot += 1;
        }
    }
}

mod duration_secs {
    use serde::{Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
