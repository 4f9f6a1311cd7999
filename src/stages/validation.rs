//! Cross-checks search parameters against the API documentation

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::docs::REFERENCE_NOTES;
use crate::error::GenerationError;
use crate::llm::{GenerationRequest, Role, StructuredGenerator, generate_structured};
use crate::models::params::DEFAULT_COUNT;
use crate::models::{GeoSearchParams, ValidationResult};

const INSTRUCTION: &str = "\
You are an expert on the Open-Meteo Geocoding API. Validate the given search parameters \
against the official documentation and correct them when needed. Prefer correcting a value \
over rejecting it: return valid=true with the corrected params when a correction makes them \
usable. Return valid=false only when the parameters cannot be made usable, and explain in \
reason exactly what has to change.";

/// Validates and, where possible, corrects extracted parameters
pub struct ValidationStage {
    generator: Arc<dyn StructuredGenerator>,
}

impl ValidationStage {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self { generator }
    }

    /// Validate `params` against `reference` documentation text. The reason
    /// from a previous failed attempt, if any, is threaded into the context.
    #[instrument(skip(self, reference))]
    pub async fn validate(
        &self,
        params: &GeoSearchParams,
        reference: &str,
        prior_reason: Option<&str>,
    ) -> Result<ValidationResult, GenerationError> {
        let params_json = serde_json::to_string(params)
            .map_err(|e| GenerationError::SchemaConformance(e.to_string()))?;

        let mut request =
            GenerationRequest::new(Role::Validator, format!("{INSTRUCTION}\n\n{REFERENCE_NOTES}"))
                .with_context(format!("Documentation page content:\n{reference}"))
                .with_context(format!("Parameters to validate: {params_json}"));
        if let Some(reason) = prior_reason {
            request = request.with_context(format!(
                "A previous validation attempt rejected these parameters: {reason}\n\
                 Correct the parameters to resolve this."
            ));
        }

        let result = generate_structured::<ValidationResult>(self.generator.as_ref(), request).await?;
        let result = enforce_contract(result);
        debug!(valid = result.valid, reason = %result.reason, "Validation verdict");
        Ok(result)
    }
}

/// Normalize the verdict and make sure an accepted parameter set really
/// satisfies the endpoint contract. Out-of-contract parameters are never
/// returned with `valid=true`.
#[must_use]
pub fn enforce_contract(result: ValidationResult) -> ValidationResult {
    let mut params = result.params.normalized();

    if !result.valid {
        let reason = if result.reason.trim().is_empty() {
            "parameters rejected without a reason".to_string()
        } else {
            result.reason
        };
        return ValidationResult::invalid(params, reason);
    }

    if params.count.is_none() {
        params.count = Some(DEFAULT_COUNT);
    }

    match params.check_api_contract() {
        Ok(()) => ValidationResult {
            valid: true,
            params,
            reason: result.reason,
        },
        Err(violation) => {
            warn!(%violation, "Validator accepted parameters that break the API contract");
            ValidationResult::invalid(params, violation)
        }
    }
}
