use analysis_core::AnalysisError;
use serde_json::Value;

/// Validates a strategy's opaque `parameters` document before it is handed to
/// a task. Only checks shape (must be a JSON object) — range-checking
/// individual filter thresholds is `filter-params`'s job (§4.11).
pub struct StrategyConfigValidator;

impl StrategyConfigValidator {
    pub fn validate(parameters: &Value) -> Result<(), AnalysisError> {
        if parameters.is_object() {
            Ok(())
        } else {
            Err(AnalysisError::InvalidData(
                "strategy parameters must be a JSON object".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_passes() {
        assert!(StrategyConfigValidator::validate(&json!({"min_touch_count": 2})).is_ok());
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(StrategyConfigValidator::validate(&json!([1, 2, 3])).is_err());
        assert!(StrategyConfigValidator::validate(&json!("not an object")).is_err());
        assert!(StrategyConfigValidator::validate(&Value::Null).is_err());
    }
}
