//! The ambient parameter channel (C11, spec §4.11).
//!
//! `FILTER_PARAMS` carries a request-scoped JSON document from the HTTP
//! boundary through to worker processes running filter code, without
//! threading a parameter through every call in between. This mirrors the
//! environment-variable-as-transport pattern the notifier config uses
//! (`NotificationConfig::from_env`) but for one structured document instead
//! of several scalar values.

use serde_json::Value;

/// Name of the environment variable carrying the request's filter parameters.
pub const FILTER_PARAMS_ENV: &str = "FILTER_PARAMS";

/// Parsed (or defaulted) view over the ambient `FILTER_PARAMS` document.
///
/// Absent env var, empty string, or malformed JSON all resolve to an empty
/// document — every lookup then falls back to its compiled default, and the
/// malformed case logs exactly one warning at construction.
#[derive(Debug, Clone)]
pub struct FilterParams {
    doc: Value,
}

impl FilterParams {
    /// Read and parse `FILTER_PARAMS` from the process environment.
    pub fn from_env() -> Self {
        match std::env::var(FILTER_PARAMS_ENV) {
            Ok(raw) if !raw.trim().is_empty() => Self::from_str(&raw),
            _ => Self {
                doc: Value::Object(Default::default()),
            },
        }
    }

    /// Parse an explicit JSON document (used by workers that receive the
    /// value some other way, and directly by tests).
    pub fn from_str(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(doc) => Self { doc },
            Err(e) => {
                tracing::warn!(
                    "malformed FILTER_PARAMS document, using compiled defaults: {}",
                    e
                );
                Self {
                    doc: Value::Object(Default::default()),
                }
            }
        }
    }

    fn lookup(&self, namespace: &str, key: &str) -> Option<&Value> {
        self.doc.get(namespace)?.get(key)
    }

    fn f64(&self, namespace: &str, key: &str, default: f64) -> f64 {
        self.lookup(namespace, key)
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }

    fn u32(&self, namespace: &str, key: &str, default: u32) -> u32 {
        self.lookup(namespace, key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(default)
    }

    /// Parameters for the `support_resistance` filter namespace (§4.11 table).
    pub fn support_resistance(&self) -> SupportResistanceParams {
        let d = SupportResistanceParams::default();
        SupportResistanceParams {
            min_support_strength: clamp_or_default(
                self.f64("support_resistance", "min_support_strength", d.min_support_strength),
                0.0,
                1.0,
                d.min_support_strength,
            ),
            min_resistance_strength: clamp_or_default(
                self.f64(
                    "support_resistance",
                    "min_resistance_strength",
                    d.min_resistance_strength,
                ),
                0.0,
                1.0,
                d.min_resistance_strength,
            ),
            min_touch_count: if self.u32("support_resistance", "min_touch_count", d.min_touch_count) >= 1
            {
                self.u32("support_resistance", "min_touch_count", d.min_touch_count)
            } else {
                d.min_touch_count
            },
            max_distance_pct: clamp_or_default(
                self.f64("support_resistance", "max_distance_pct", d.max_distance_pct),
                f64::EPSILON,
                1.0,
                d.max_distance_pct,
            ),
            tolerance_pct: clamp_or_default(
                self.f64("support_resistance", "tolerance_pct", d.tolerance_pct),
                f64::EPSILON,
                1.0 - f64::EPSILON,
                d.tolerance_pct,
            ),
            fractal_window: if self.u32("support_resistance", "fractal_window", d.fractal_window) >= 3 {
                self.u32("support_resistance", "fractal_window", d.fractal_window)
            } else {
                d.fractal_window
            },
        }
    }
}

/// Returns `value` if it falls within `[min, max]`, otherwise `default`.
/// A value outside its documented range is treated the same as an absent
/// value — it never raises, it just doesn't override the default.
fn clamp_or_default(value: f64, min: f64, max: f64, default: f64) -> f64 {
    if value >= min && value <= max {
        value
    } else {
        default
    }
}

/// Tunable thresholds for the support/resistance filter (Filter 3) and the
/// S/R detection step it gates on, per the §4.11 table.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportResistanceParams {
    pub min_support_strength: f64,
    pub min_resistance_strength: f64,
    pub min_touch_count: u32,
    pub max_distance_pct: f64,
    pub tolerance_pct: f64,
    pub fractal_window: u32,
}

impl Default for SupportResistanceParams {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_document_uses_defaults() {
        let params = FilterParams::from_str("");
        assert_eq!(params.support_resistance(), SupportResistanceParams::default());
    }

    #[test]
    fn malformed_document_uses_defaults() {
        let params = FilterParams::from_str("{broken");
        assert_eq!(params.support_resistance(), SupportResistanceParams::default());
    }

    #[test]
    fn present_value_overrides_default() {
        let params = FilterParams::from_str(
            r#"{"support_resistance":{"min_touch_count":1,"tolerance_pct":0.05}}"#,
        );
        let sr = params.support_resistance();
        assert_eq!(sr.min_touch_count, 1);
        assert_eq!(sr.tolerance_pct, 0.05);
        // untouched fields stay at default
        assert_eq!(sr.min_support_strength, 0.5);
        assert_eq!(sr.fractal_window, 5);
    }

    #[test]
    fn out_of_range_value_falls_back_to_default() {
        let params =
            FilterParams::from_str(r#"{"support_resistance":{"min_support_strength":5.0}}"#);
        assert_eq!(params.support_resistance().min_support_strength, 0.5);
    }

    #[test]
    fn absent_env_var_uses_defaults() {
        std::env::remove_var(FILTER_PARAMS_ENV);
        let params = FilterParams::from_env();
        assert_eq!(params.support_resistance(), SupportResistanceParams::default());
    }
}
