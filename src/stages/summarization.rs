//! Narrative summary of geocoding results

use std::sync::Arc;
use tracing::instrument;

use crate::error::GenerationError;
use crate::llm::{GenerationRequest, Role, StructuredGenerator, generate_text};
use crate::models::{GeocodingResponse, Summary};

const INSTRUCTION: &str = "\
You are a knowledgeable local guide. Write a well-structured, engaging summary about the city \
described by the geocoding data, with these sections:
1. Introduction: the city's name and country, and a reference to the user's original question.
2. Geographical Overview: coordinates, elevation and timezone, and what makes the location unique.
3. Demographics: population statistics if available.
4. Historical Context: a brief historical background.
5. Interesting Facts: two or three notable facts.
6. Practical Information: postcodes if available.
Write in a friendly, informative tone.";

/// Turns raw geocoding results into a narrative
pub struct SummarizationStage {
    generator: Arc<dyn StructuredGenerator>,
}

impl SummarizationStage {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self { generator }
    }

    /// Summarize a non-empty result set. Single call, no retry.
    #[instrument(skip(self, response), fields(results = response.len()))]
    pub async fn summarize(
        &self,
        query: &str,
        response: &GeocodingResponse,
    ) -> Result<Summary, GenerationError> {
        let payload = serde_json::to_string(response)
            .map_err(|e| GenerationError::SchemaConformance(e.to_string()))?;

        let matches = response
            .results
            .iter()
            .map(|place| place.display_name())
            .collect::<Vec<_>>()
            .join("; ");

        let request = GenerationRequest::new(Role::Summarizer, INSTRUCTION)
            .with_context(format!("User question: '{query}'"))
            .with_context(format!("Geocoding data to use: {payload}"))
            .with_context(format!(
                "Matched places, best match first: {matches}. Focus on the first one."
            ));

        generate_text(self.generator.as_ref(), request).await
    }
}
