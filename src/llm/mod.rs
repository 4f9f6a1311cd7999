//! Structured text generation
//!
//! A [`StructuredGenerator`] makes exactly one call to a text-generation
//! provider. The helpers in this module put the validate-or-reject boundary
//! around that call: model output is parsed, deserialized into the target
//! contract and checked, and any mismatch becomes
//! [`GenerationError::SchemaConformance`]. Retries are the caller's concern.

pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Instant;
use tracing::debug;

use crate::error::GenerationError;
use crate::models::{SchemaContract, Summary};
use crate::telemetry::{self, CallDetail, CallEvent};

pub use gemini::GeminiGenerator;

/// The stage a generation call is made for. Selects temperature and labels
/// observability events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Gatekeeper,
    Extractor,
    Validator,
    Summarizer,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Gatekeeper => "gatekeeper",
            Role::Extractor => "extractor",
            Role::Validator => "validator",
            Role::Summarizer => "summarizer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token counts reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A single generation call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub role: Role,
    /// Role-specific system instruction
    pub instruction: String,
    /// Conversational context, in order
    pub context: Vec<String>,
    /// JSON schema the output must conform to; `None` for free text
    pub schema: Option<Value>,
}

impl GenerationRequest {
    pub fn new(role: Role, instruction: impl Into<String>) -> Self {
        Self {
            role,
            instruction: instruction.into(),
            context: Vec::new(),
            schema: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Raw provider output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

/// One call to a text-generation capability. Implementations hold no state
/// between calls and never retry.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, GenerationError>;
}

/// JSON schema for a contract type, in the form sent to the provider
pub fn schema_for<T: SchemaContract>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut schema {
        map.remove("$schema");
    }
    schema
}

/// Parse model output into a contract type. Tolerates a fenced code block
/// around the JSON.
pub fn parse_structured<T: SchemaContract>(text: &str) -> Result<T, GenerationError> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Err(GenerationError::EmptyOutput);
    }
    let value: T = serde_json::from_str(body)
        .map_err(|e| GenerationError::SchemaConformance(e.to_string()))?;
    value
        .check_contract()
        .map_err(GenerationError::SchemaConformance)?;
    Ok(value)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_end();
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop the info string ("json") of the opening fence, which may share
    // its line with the body
    let body = match rest.split_once('\n') {
        Some((info, body)) if !info.trim_start().starts_with(['{', '[']) => body,
        _ => {
            let single = rest.trim_start();
            single.strip_prefix("json").unwrap_or(single)
        }
    };
    body.trim()
}

/// Generate a value conforming to `T`, emitting one observability event.
pub async fn generate_structured<T: SchemaContract>(
    generator: &dyn StructuredGenerator,
    request: GenerationRequest,
) -> Result<T, GenerationError> {
    let role = request.role;
    let request = request.with_schema(schema_for::<T>());
    let start = Instant::now();
    let outcome = generator.generate(request).await;
    let usage = outcome.as_ref().map(|g| g.usage).unwrap_or_default();
    let result = outcome.and_then(|generation| {
        debug!(role = %role, output = %generation.text, "structured generation output");
        parse_structured::<T>(&generation.text)
    });

    telemetry::record_call(&CallEvent {
        stage: role.as_str(),
        latency: start.elapsed(),
        detail: CallDetail::Tokens(usage),
        success: result.is_ok(),
    });
    result
}

/// Generate free text, rejecting blank output. Emits one observability event.
pub async fn generate_text(
    generator: &dyn StructuredGenerator,
    request: GenerationRequest,
) -> Result<Summary, GenerationError> {
    let role = request.role;
    let start = Instant::now();
    let outcome = generator.generate(request).await;
    let usage = outcome.as_ref().map(|g| g.usage).unwrap_or_default();
    let result =
        outcome.and_then(|generation| Summary::new(generation.text).ok_or(GenerationError::EmptyOutput));

    telemetry::record_call(&CallEvent {
        stage: role.as_str(),
        latency: start.elapsed(),
        detail: CallDetail::Tokens(usage),
        success: result.is_ok(),
    });
    result
}
