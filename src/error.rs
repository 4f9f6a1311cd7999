//! Error types and handling for `CityScout`

use serde::Serialize;
use thiserror::Error;

/// Main error type for application-level failures (configuration, client
/// construction). Pipeline stage failures never surface as this type;
/// the orchestrator turns them into [`PipelineFailure`] values instead.
#[derive(Error, Debug)]
pub enum CityScoutError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// API communication errors
    #[error("API error: {message}")]
    Api { message: String },
}

impl CityScoutError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            CityScoutError::Config { message } => {
                format!("Configuration error: {message}. Please check your config file and API keys.")
            }
            CityScoutError::Api { .. } => {
                "Unable to connect to external services. Please check your internet connection."
                    .to_string()
            }
        }
    }
}

/// Failure of a single text-generation call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation provider error: {0}")]
    Provider(String),

    #[error("generation timed out: {0}")]
    Timeout(String),

    #[error("output does not match the expected schema: {0}")]
    SchemaConformance(String),

    #[error("generation returned no text")]
    EmptyOutput,
}

/// Failure of a single geocoding request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("geocoding API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode geocoding response: {0}")]
    Decode(String),
}

/// Terminal failure of a pipeline run, carrying the last captured reason.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineFailure {
    #[error("parameter extraction failed after {attempts} attempts: {reason}")]
    ExtractionExhausted { attempts: u32, reason: String },

    #[error("parameter validation failed after {attempts} attempts: {reason}")]
    ValidationExhausted { attempts: u32, reason: String },

    #[error("geocoding request failed after {attempts} attempts: {reason}")]
    FetchExhausted { attempts: u32, reason: String },

    #[error("summarization failed: {reason}")]
    Summarization { reason: String },
}

impl PipelineFailure {
    /// The last reason captured before the pipeline gave up.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            PipelineFailure::ExtractionExhausted { reason, .. }
            | PipelineFailure::ValidationExhausted { reason, .. }
            | PipelineFailure::FetchExhausted { reason, .. }
            | PipelineFailure::Summarization { reason } => reason,
        }
    }
}
