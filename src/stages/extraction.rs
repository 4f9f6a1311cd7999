//! Parameter extraction from a natural-language question

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::GenerationError;
use crate::llm::{GenerationRequest, Role, StructuredGenerator, generate_structured};
use crate::models::GeoSearchParams;

const INSTRUCTION: &str = "\
You convert natural language questions about a city into parameters for the Open-Meteo \
Geocoding API city search. You only care about city metadata (coordinates, elevation, \
population, timezone, postcodes).
Fields:
- name (required): the city or place name to search for. If not stated directly, infer it from context.
- count (optional, default 10): number of results, 1-100.
- language (optional, default 'en'): lower-case IETF language code. Detect it from the question \
when possible, e.g. 'cities in France' -> 'fr'.
- countryCode (optional): ISO-3166-1 alpha-2 country code, e.g. 'US', 'FR', 'JP'.
Example: {\"name\": \"Paris\", \"count\": 5, \"language\": \"fr\", \"countryCode\": \"FR\"}";

/// Turns a gated user query into geocoding search parameters
pub struct ExtractionStage {
    generator: Arc<dyn StructuredGenerator>,
}

impl ExtractionStage {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self { generator }
    }

    /// Extract parameters. A schema-conformance failure (including an empty
    /// name) is returned to the caller.
    #[instrument(skip(self))]
    pub async fn extract(&self, query: &str) -> Result<GeoSearchParams, GenerationError> {
        let request = GenerationRequest::new(Role::Extractor, INSTRUCTION)
            .with_context(format!("User question: {query}"));

        let params = generate_structured::<GeoSearchParams>(self.generator.as_ref(), request)
            .await?
            .normalized();
        debug!(?params, "Extracted search parameters");
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    #[tokio::test]
    async fn test_extracts_and_normalizes() {
        let generator = Arc::new(ScriptedGenerator::new().reply(
            Role::Extractor,
            r#"{"name": " Paris ", "count": 5, "language": "FR", "countryCode": "fr"}"#,
        ));
        let stage = ExtractionStage::new(generator);

        let params = stage.extract("Tell me about Paris in French").await.unwrap();
        assert_eq!(
            params,
            GeoSearchParams::named("Paris")
                .with_count(5)
                .with_language("fr")
                .with_country_code("FR")
        );
    }

    #[tokio::test]
    async fn test_empty_name_is_schema_failure() {
        let generator = Arc::new(ScriptedGenerator::new().reply(Role::Extractor, r#"{"name": ""}"#));
        let stage = ExtractionStage::new(generator);

        let result = stage.extract("Tell me about it").await;
        assert!(matches!(result, Err(GenerationError::SchemaConformance(_))));
    }

    #[tokio::test]
    async fn test_out_of_range_count_is_left_for_validation() {
        let generator =
            Arc::new(ScriptedGenerator::new().reply(Role::Extractor, r#"{"name": "Lima", "count": 250}"#));
        let stage = ExtractionStage::new(generator);

        let params = stage.extract("List 250 places called Lima").await.unwrap();
        assert_eq!(params.count, Some(250));
    }
}
