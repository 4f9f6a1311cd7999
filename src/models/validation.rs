//! Validator verdict on a parameter set

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{GeoSearchParams, SchemaContract};

/// Verdict returned by the validation stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationResult {
    /// True if the parameters can be used with the API as they are
    pub valid: bool,
    /// The validated and possibly corrected parameters
    pub params: GeoSearchParams,
    /// Why validation passed or failed; details what needs correcting on failure
    #[serde(default)]
    pub reason: String,
}

impl ValidationResult {
    pub fn invalid(params: GeoSearchParams, reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            params,
            reason: reason.into(),
        }
    }
}

impl SchemaContract for ValidationResult {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_validation_result() {
        let result: ValidationResult = serde_json::from_str(
            r#"{"valid": false, "params": {"name": "Paris", "count": 500}, "reason": "count too large"}"#,
        )
        .unwrap();
        assert!(!result.valid);
        assert_eq!(result.params.count, Some(500));
        assert_eq!(result.reason, "count too large");
    }

    #[test]
    fn test_reason_defaults_to_empty() {
        let result: ValidationResult =
            serde_json::from_str(r#"{"valid": true, "params": {"name": "Paris"}}"#).unwrap();
        assert!(result.valid);
        assert!(result.reason.is_empty());
    }

    #[test]
    fn test_missing_params_is_rejected() {
        let result = serde_json::from_str::<ValidationResult>(r#"{"valid": true}"#);
        assert!(result.is_err());
    }
}
