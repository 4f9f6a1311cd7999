//! Data contracts exchanged between pipeline stages
//!
//! - Gate: the admission decision for a user query
//! - Params: Open-Meteo geocoding search parameters
//! - Validation: the validator's verdict on a set of parameters
//! - Geocoding: raw place records returned by the geocoding API

pub mod gate;
pub mod geocoding;
pub mod params;
pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use gate::QueryGateResult;
pub use geocoding::{GeocodingResponse, Place};
pub use params::GeoSearchParams;
pub use validation::ValidationResult;

/// A type that model output must be coerced into.
///
/// Deserialization alone only checks the shape; `check_contract` rejects
/// values that deserialize but break an invariant of the contract.
pub trait SchemaContract: serde::de::DeserializeOwned + schemars::JsonSchema {
    fn check_contract(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Final free-text narrative produced by the summarization stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Summary(String);

impl Summary {
    /// Wrap narrative text, rejecting blank output
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
