//! Pipeline orchestration
//!
//! Sequences the stages of a run as a state machine:
//!
//! ```text
//! Gating -> Extracting -> Validating -> Fetching -> Summarizing -> Done
//!    |           |            |            |  \           |
//!    v           v            v            v   `-> Done   v
//! Rejected     Failed       Failed       Failed  (no match) Failed
//! ```
//!
//! Extraction, validation and fetching loop on themselves up to their retry
//! bounds. Every stage error is converted into a terminal state here; none
//! escapes a run.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::config::CityScoutConfig;
use crate::docs::{DocumentationSource, HttpDocumentationFetcher, REFERENCE_NOTES, StaticReference};
use crate::error::PipelineFailure;
use crate::geocoding::{GeocodingApi, OpenMeteoGeocoder};
use crate::llm::{GeminiGenerator, StructuredGenerator};
use crate::models::{GeoSearchParams, GeocodingResponse, Summary};
use crate::stages::{ExtractionStage, GatekeeperStage, SummarizationStage, ValidationStage};
use crate::Result;

/// States of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Gating,
    Extracting,
    Validating,
    Fetching,
    Summarizing,
    Done,
    Rejected,
    Failed,
}

impl PipelineState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Done | PipelineState::Rejected | PipelineState::Failed
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Gating => "GATING",
            PipelineState::Extracting => "EXTRACTING",
            PipelineState::Validating => "VALIDATING",
            PipelineState::Fetching => "FETCHING",
            PipelineState::Summarizing => "SUMMARIZING",
            PipelineState::Done => "DONE",
            PipelineState::Rejected => "REJECTED",
            PipelineState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The gate declined the query
    Rejected { message: String },
    /// The API was reachable but nothing matched
    NoMatch { params: GeoSearchParams },
    Summarized {
        summary: Summary,
        params: GeoSearchParams,
        response: GeocodingResponse,
    },
    Failed { failure: PipelineFailure },
}

impl Outcome {
    #[must_use]
    pub fn terminal_state(&self) -> PipelineState {
        match self {
            Outcome::Rejected { .. } => PipelineState::Rejected,
            Outcome::NoMatch { .. } | Outcome::Summarized { .. } => PipelineState::Done,
            Outcome::Failed { .. } => PipelineState::Failed,
        }
    }

    /// Text shown to the user. A rejection shows only the gate's message.
    #[must_use]
    pub fn user_output(&self) -> String {
        match self {
            Outcome::Rejected { message } => message.clone(),
            Outcome::NoMatch { params } => format!(
                "No match found for '{}'. Try a different spelling or a larger nearby city.",
                params.name
            ),
            Outcome::Summarized { summary, .. } => summary.as_str().to_string(),
            Outcome::Failed { failure } => format!(
                "Sorry, the city information workflow could not complete. Reason: {}",
                failure.reason()
            ),
        }
    }
}

/// Attempts made by each retrying stage during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageAttempts {
    pub extraction: u32,
    pub validation: u32,
    pub fetch: u32,
}

/// Everything observable about a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub query: String,
    pub outcome: Outcome,
    /// Validated parameters, when the run got past validation
    pub params: Option<GeoSearchParams>,
    /// States entered, in order, including retries and the terminal state
    pub transitions: Vec<PipelineState>,
    pub attempts: StageAttempts,
}

impl PipelineReport {
    #[must_use]
    pub fn final_state(&self) -> PipelineState {
        self.outcome.terminal_state()
    }
}

/// Retry bounds. Only fetching waits between attempts, for the same
/// `fetch_backoff` each time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub extraction_attempts: u32,
    pub validation_attempts: u32,
    pub fetch_attempts: u32,
    pub fetch_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            extraction_attempts: 3,
            validation_attempts: 3,
            fetch_attempts: 3,
            fetch_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &CityScoutConfig) -> Self {
        Self {
            extraction_attempts: config.pipeline.extraction_attempts.max(1),
            validation_attempts: config.pipeline.validation_attempts.max(1),
            fetch_attempts: config.pipeline.fetch_attempts.max(1),
            fetch_backoff: Duration::from_millis(config.pipeline.fetch_backoff_ms),
        }
    }
}

/// Waits between fetch attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Default)]
struct RunTracker {
    transitions: Vec<PipelineState>,
    attempts: StageAttempts,
}

impl RunTracker {
    fn enter(&mut self, state: PipelineState) {
        if state.is_terminal() {
            info!(state = %state, steps = self.transitions.len(), "Pipeline finished");
        } else {
            info!(state = %state, "Pipeline transition");
        }
        self.transitions.push(state);
    }
}

/// Runs the city information workflow for one query at a time
pub struct PipelineOrchestrator {
    gatekeeper: GatekeeperStage,
    extraction: ExtractionStage,
    validation: ValidationStage,
    summarization: SummarizationStage,
    geocoder: Arc<dyn GeocodingApi>,
    docs: Arc<dyn DocumentationSource>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl PipelineOrchestrator {
    pub fn new(
        generator: Arc<dyn StructuredGenerator>,
        geocoder: Arc<dyn GeocodingApi>,
        docs: Arc<dyn DocumentationSource>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            gatekeeper: GatekeeperStage::new(generator.clone()),
            extraction: ExtractionStage::new(generator.clone()),
            validation: ValidationStage::new(generator.clone()),
            summarization: SummarizationStage::new(generator),
            geocoder,
            docs,
            sleeper: Arc::new(TokioSleeper),
            policy,
        }
    }

    /// Build the production collaborators from configuration
    pub fn from_config(config: &CityScoutConfig) -> Result<Self> {
        let generator: Arc<dyn StructuredGenerator> = Arc::new(GeminiGenerator::new(&config.llm)?);
        let geocoder: Arc<dyn GeocodingApi> = Arc::new(OpenMeteoGeocoder::new(&config.geocoding)?);
        let docs: Arc<dyn DocumentationSource> = if config.docs.enabled {
            Arc::new(HttpDocumentationFetcher::new(&config.docs)?)
        } else {
            Arc::new(StaticReference::default())
        };
        Ok(Self::new(generator, geocoder, docs, RetryPolicy::from_config(config)))
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Run the pipeline for one query. Always reaches exactly one terminal
    /// state.
    #[instrument(skip(self))]
    pub async fn run(&self, query: &str) -> PipelineReport {
        let mut tracker = RunTracker::default();

        let outcome = match self.drive(query, &mut tracker).await {
            Ok(outcome) => outcome,
            Err(failure) => {
                error!(error = %failure, "Pipeline failed");
                Outcome::Failed { failure }
            }
        };
        tracker.enter(outcome.terminal_state());

        let params = match &outcome {
            Outcome::NoMatch { params } | Outcome::Summarized { params, .. } => Some(params.clone()),
            Outcome::Rejected { .. } | Outcome::Failed { .. } => None,
        };

        PipelineReport {
            query: query.to_string(),
            outcome,
            params,
            transitions: tracker.transitions,
            attempts: tracker.attempts,
        }
    }

    async fn drive(
        &self,
        query: &str,
        tracker: &mut RunTracker,
    ) -> std::result::Result<Outcome, PipelineFailure> {
        tracker.enter(PipelineState::Gating);
        let gate = self.gatekeeper.evaluate(query).await;
        if !gate.passes() {
            return Ok(Outcome::Rejected {
                message: gate.return_message_to_user,
            });
        }

        let extracted = self.extract(query, tracker).await?;
        let params = self.validate(extracted, tracker).await?;
        let response = self.fetch(&params, tracker).await?;

        if response.is_empty() {
            info!(name = %params.name, "No match found, skipping summarization");
            return Ok(Outcome::NoMatch { params });
        }

        tracker.enter(PipelineState::Summarizing);
        let summary = self
            .summarization
            .summarize(query, &response)
            .await
            .map_err(|e| PipelineFailure::Summarization {
                reason: e.to_string(),
            })?;

        Ok(Outcome::Summarized {
            summary,
            params,
            response,
        })
    }

    async fn extract(
        &self,
        query: &str,
        tracker: &mut RunTracker,
    ) -> std::result::Result<GeoSearchParams, PipelineFailure> {
        let bound = self.policy.extraction_attempts;
        let mut last_reason = String::new();

        for attempt in 1..=bound {
            tracker.enter(PipelineState::Extracting);
            tracker.attempts.extraction = attempt;

            match self.extraction.extract(query).await {
                Ok(params) => return Ok(params),
                Err(e) => {
                    warn!(attempt, max_attempts = bound, error = %e, "Parameter extraction failed");
                    last_reason = e.to_string();
                }
            }
        }

        Err(PipelineFailure::ExtractionExhausted {
            attempts: bound,
            reason: last_reason,
        })
    }

    async fn validate(
        &self,
        params: GeoSearchParams,
        tracker: &mut RunTracker,
    ) -> std::result::Result<GeoSearchParams, PipelineFailure> {
        let reference = match self.docs.fetch_reference().await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Documentation unavailable, using built-in reference notes");
                REFERENCE_NOTES.to_string()
            }
        };

        let bound = self.policy.validation_attempts;
        let mut candidate = params;
        let mut last_reason: Option<String> = None;

        for attempt in 1..=bound {
            tracker.enter(PipelineState::Validating);
            tracker.attempts.validation = attempt;

            match self
                .validation
                .validate(&candidate, &reference, last_reason.as_deref())
                .await
            {
                Ok(result) if result.valid => {
                    info!(params = ?result.params, "Parameters validated");
                    return Ok(result.params);
                }
                Ok(result) => {
                    warn!(attempt, max_attempts = bound, reason = %result.reason, "Parameters rejected by validator");
                    if !result.params.name.is_empty() {
                        candidate = result.params;
                    }
                    last_reason = Some(result.reason);
                }
                Err(e) => {
                    warn!(attempt, max_attempts = bound, error = %e, "Validation call failed");
                    last_reason = Some(e.to_string());
                }
            }
        }

        Err(PipelineFailure::ValidationExhausted {
            attempts: bound,
            reason: last_reason.unwrap_or_default(),
        })
    }

    async fn fetch(
        &self,
        params: &GeoSearchParams,
        tracker: &mut RunTracker,
    ) -> std::result::Result<GeocodingResponse, PipelineFailure> {
        let bound = self.policy.fetch_attempts;
        let mut last_reason = String::new();

        for attempt in 1..=bound {
            tracker.enter(PipelineState::Fetching);
            tracker.attempts.fetch = attempt;

            match self.geocoder.search(params).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    last_reason = e.to_string();
                    if attempt < bound {
                        let delay = self.policy.fetch_backoff;
                        warn!(
                            attempt,
                            max_attempts = bound,
                            error = %e,
                            "Geocoding request failed, retrying in {:.1}s",
                            delay.as_secs_f64()
                        );
                        self.sleeper.sleep(delay).await;
                    }
                }
            }
        }

        Err(PipelineFailure::FetchExhausted {
            attempts: bound,
            reason: last_reason,
        })
    }
}
