//! Admission decision for a user query

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::SchemaContract;

/// Guidance shown when a query is rejected without a usable message
pub const DEFAULT_GUIDANCE: &str = "This workflow provides city information (coordinates, \
elevation, timezone, population, postcodes) via the Open-Meteo Geocoding API. Please ask a \
city-focused question, e.g. 'Tell me about Paris, FR' or 'Give me details about Tokyo'.";

/// Gatekeeper verdict on whether a query is city-related and safe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QueryGateResult {
    /// True if the input is about a city or place, or clearly requests city information
    pub is_city_query: bool,
    /// True if the input is safe and appropriate to process
    pub is_safe: bool,
    /// Internal reason for a rejection; never shown to the user
    #[serde(rename = "safetyReason", default)]
    pub safety_reason: String,
    /// User-facing guidance on how to phrase a valid city-focused query
    #[serde(rename = "returnMessageToUser", default)]
    pub return_message_to_user: String,
}

impl QueryGateResult {
    /// A rejecting verdict carrying the default guidance
    pub fn rejected(safety_reason: impl Into<String>) -> Self {
        Self {
            is_city_query: false,
            is_safe: false,
            safety_reason: safety_reason.into(),
            return_message_to_user: DEFAULT_GUIDANCE.to_string(),
        }
    }

    /// Whether the pipeline may continue past the gate
    #[must_use]
    pub fn passes(&self) -> bool {
        self.is_city_query && self.is_safe
    }

    /// Ensure a rejection always carries a non-empty user message
    #[must_use]
    pub fn with_guidance(mut self) -> Self {
        if !self.passes() && self.return_message_to_user.trim().is_empty() {
            self.return_message_to_user = DEFAULT_GUIDANCE.to_string();
        }
        self
    }
}

impl SchemaContract for QueryGateResult {}
