//! `CityScout` - Safety-gated city information pipeline
//!
//! This library screens a natural-language question, turns it into Open-Meteo
//! geocoding search parameters, validates them against the API documentation,
//! fetches matching places and summarizes them.

pub mod config;
pub mod docs;
pub mod error;
pub mod geocoding;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod stages;
pub mod telemetry;

#[cfg(test)]
mod testing;

// Re-export core types for public API
pub use config::CityScoutConfig;
pub use docs::{DocumentationSource, HttpDocumentationFetcher, StaticReference};
pub use error::{CityScoutError, FetchError, GenerationError, PipelineFailure};
pub use geocoding::{GeocodingApi, OpenMeteoGeocoder};
pub use llm::{GeminiGenerator, Role, StructuredGenerator};
pub use models::{GeoSearchParams, GeocodingResponse, Place, QueryGateResult, Summary, ValidationResult};
pub use pipeline::{Outcome, PipelineOrchestrator, PipelineReport, PipelineState, RetryPolicy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, CityScoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
