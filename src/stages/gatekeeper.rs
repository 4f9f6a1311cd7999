//! Admission control for user queries

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::llm::{GenerationRequest, Role, StructuredGenerator, generate_structured};
use crate::models::QueryGateResult;

const INSTRUCTION: &str = "\
You are the first line of defense for a city information workflow backed by the Open-Meteo \
Geocoding API. Decide whether the user input is city-related (asks about a city or place, or \
requests city information) and whether it is safe and appropriate to process.
If acceptable, set is_city_query and is_safe to true and leave safetyReason and \
returnMessageToUser empty.
Otherwise set is_city_query=false or is_safe=false, put an internal explanation in \
safetyReason, and put abstract user-facing guidance in returnMessageToUser, e.g. \
'Please ask a city-focused question, e.g. \"Tell me about Paris, FR\" or \"Give me details \
about Tokyo\".' Never reveal the internal safety analysis to the user.";

/// Decides whether a query is in-domain and safe
pub struct GatekeeperStage {
    generator: Arc<dyn StructuredGenerator>,
}

impl GatekeeperStage {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self { generator }
    }

    /// Evaluate a query. Single call, no retry: a failed or malformed
    /// decision is a rejection.
    #[instrument(skip(self))]
    pub async fn evaluate(&self, query: &str) -> QueryGateResult {
        let request = GenerationRequest::new(Role::Gatekeeper, INSTRUCTION)
            .with_context(format!("User input: {query}"));

        match generate_structured::<QueryGateResult>(self.generator.as_ref(), request).await {
            Ok(gate) => {
                let gate = gate.with_guidance();
                if gate.passes() {
                    info!("Query accepted by gatekeeper");
                } else {
                    info!(
                        is_city_query = gate.is_city_query,
                        is_safe = gate.is_safe,
                        "Query rejected by gatekeeper"
                    );
                    debug!(safety_reason = %gate.safety_reason, "Gatekeeper rejection reason");
                }
                gate
            }
            Err(e) => {
                warn!(error = %e, "Gatekeeper decision unavailable, rejecting query");
                QueryGateResult::rejected(format!("gate decision unavailable: {e}"))
            }
        }
    }
}
