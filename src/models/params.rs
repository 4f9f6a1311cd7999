//! Geocoding search parameters

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::SchemaContract;

/// Result count filled in when an accepted parameter set has none
pub const DEFAULT_COUNT: u32 = 10;
/// Largest result count the search endpoint accepts
pub const MAX_COUNT: u32 = 100;

static LANGUAGE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2,3}(-[a-z0-9]{2,8})*$").expect("valid language regex"));

/// Parameters for the Open-Meteo geocoding search endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GeoSearchParams {
    /// City or place name to search for
    pub name: String,
    /// Number of results to return, 1..100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1, max = 100))]
    pub count: Option<u32>,
    /// Lower-cased IETF language tag, e.g. en, es, fr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// ISO-3166-1 alpha-2 country filter, e.g. US, FR, JP
    #[serde(
        rename = "countryCode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub country_code: Option<String>,
}

impl GeoSearchParams {
    /// Parameters searching only by name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            count: None,
            language: None,
            country_code: None,
        }
    }

    #[must_use]
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn with_country_code(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = Some(country_code.into());
        self
    }

    /// Canonical form: trimmed name, lower-case language, upper-case
    /// country code, blank optional values dropped.
    #[must_use]
    pub fn normalized(self) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            name: self.name.trim().to_string(),
            count: self.count,
            language: clean(self.language).map(|v| v.to_lowercase()),
            country_code: clean(self.country_code).map(|v| v.to_uppercase()),
        }
    }

    /// Check the values against the documented contract of the search
    /// endpoint. Expects normalized parameters.
    pub fn check_api_contract(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required and must not be empty".to_string());
        }

        if let Some(count) = self.count {
            if !(1..=MAX_COUNT).contains(&count) {
                return Err(format!("count must be between 1 and {MAX_COUNT}, got {count}"));
            }
        }

        if let Some(language) = &self.language {
            if !LANGUAGE_TAG.is_match(language) {
                return Err(format!(
                    "language must be a lower-case IETF language tag, got '{language}'"
                ));
            }
        }

        if let Some(country_code) = &self.country_code {
            if country_code.len() != 2 || !country_code.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(format!(
                    "countryCode must be an ISO-3166-1 alpha-2 code, got '{country_code}'"
                ));
            }
        }

        Ok(())
    }

    /// Query string pairs for the search endpoint. Absent optional values
    /// are omitted rather than sent empty.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("name", self.name.clone())];
        if let Some(count) = self.count {
            pairs.push(("count", count.to_string()));
        }
        if let Some(language) = self.language.as_deref().filter(|v| !v.is_empty()) {
            pairs.push(("language", language.to_string()));
        }
        if let Some(country_code) = self.country_code.as_deref().filter(|v| !v.is_empty()) {
            pairs.push(("countryCode", country_code.to_string()));
        }
        pairs.push(("format", "json".to_string()));
        pairs
    }
}

impl SchemaContract for GeoSearchParams {
    fn check_contract(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            Err("name is required and must not be empty".to_string())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_deserialize_uses_api_field_names() {
        let params: GeoSearchParams = serde_json::from_str(
            r#"{"name": "Paris", "count": 5, "language": "fr", "countryCode": "FR"}"#,
        )
        .unwrap();
        assert_eq!(
            params,
            GeoSearchParams::named("Paris")
                .with_count(5)
                .with_language("fr")
                .with_country_code("FR")
        );
    }

    #[test]
    fn test_serialize_skips_absent_fields() {
        let json = serde_json::to_value(GeoSearchParams::named("Tokyo")).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Tokyo"}));
    }

    #[test]
    fn test_normalized() {
        let params = GeoSearchParams {
            name: "  San Francisco ".to_string(),
            count: Some(3),
            language: Some("EN".to_string()),
            country_code: Some(" us".to_string()),
        }
        .normalized();
        assert_eq!(params.name, "San Francisco");
        assert_eq!(params.language.as_deref(), Some("en"));
        assert_eq!(params.country_code.as_deref(), Some("US"));
    }

    #[test]
    fn test_normalized_drops_blank_optionals() {
        let params = GeoSearchParams {
            name: "Berlin".to_string(),
            count: None,
            language: Some("  ".to_string()),
            country_code: Some(String::new()),
        }
        .normalized();
        assert!(params.language.is_none());
        assert!(params.country_code.is_none());
    }

    #[rstest]
    #[case(GeoSearchParams::named("Paris"))]
    #[case(GeoSearchParams::named("Paris").with_count(1))]
    #[case(GeoSearchParams::named("Paris").with_count(100))]
    #[case(GeoSearchParams::named("Paris").with_language("pt-br"))]
    #[case(GeoSearchParams::named("Paris").with_country_code("FR"))]
    fn test_api_contract_accepts(#[case] params: GeoSearchParams) {
        assert!(params.check_api_contract().is_ok());
    }

    #[rstest]
    #[case(GeoSearchParams::named(""), "name")]
    #[case(GeoSearchParams::named("Paris").with_count(0), "count")]
    #[case(GeoSearchParams::named("Paris").with_count(101), "count")]
    #[case(GeoSearchParams::named("Paris").with_language("English"), "language")]
    #[case(GeoSearchParams::named("Paris").with_country_code("FRA"), "countryCode")]
    #[case(GeoSearchParams::named("Paris").with_country_code("F1"), "countryCode")]
    fn test_api_contract_rejects(#[case] params: GeoSearchParams, #[case] field: &str) {
        let reason = params.check_api_contract().unwrap_err();
        assert!(reason.contains(field), "unexpected reason: {reason}");
    }

    #[test]
    fn test_query_pairs_omit_absent_optionals() {
        let pairs = GeoSearchParams::named("Tokyo").query_pairs();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["name", "format"]);
    }

    #[test]
    fn test_query_pairs_include_present_optionals() {
        let pairs = GeoSearchParams::named("Paris")
            .with_count(5)
            .with_language("fr")
            .with_country_code("FR")
            .query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("name", "Paris".to_string()),
                ("count", "5".to_string()),
                ("language", "fr".to_string()),
                ("countryCode", "FR".to_string()),
                ("format", "json".to_string()),
            ]
        );
    }

    #[test]
    fn test_schema_contract_requires_name() {
        assert!(GeoSearchParams::named(" ").check_contract().is_err());
        assert!(GeoSearchParams::named("Lima").with_count(500).check_contract().is_ok());
    }
}
