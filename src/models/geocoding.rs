//! Geocoding API response model

use serde::{Deserialize, Serialize};

/// Result set returned by the Open-Meteo geocoding search endpoint.
/// A response without a `results` key carries zero places.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodingResponse {
    #[serde(default)]
    pub results: Vec<Place>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generationtime_ms: Option<f64>,
}

/// A single place record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Place {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub postcodes: Vec<String>,
}

impl GeocodingResponse {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }
}

impl Place {
    /// Name qualified with first-level admin division and country
    #[must_use]
    pub fn display_name(&self) -> String {
        [Some(self.name.as_str()), self.admin1.as_deref(), self.country.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAN_FRANCISCO: &str = r#"{
        "results": [{
            "id": 5391959,
            "name": "San Francisco",
            "latitude": 37.77493,
            "longitude": -122.41942,
            "elevation": 16.0,
            "feature_code": "PPLA2",
            "country_code": "US",
            "admin1_id": 5332921,
            "timezone": "America/Los_Angeles",
            "population": 864816,
            "postcodes": ["94102", "94103"],
            "country_id": 6252001,
            "country": "United States",
            "admin1": "California",
            "admin2": "City and County of San Francisco"
        }],
        "generationtime_ms": 0.9
    }"#;

    #[test]
    fn test_parse_search_response() {
        let response: GeocodingResponse = serde_json::from_str(SAN_FRANCISCO).unwrap();
        assert_eq!(response.len(), 1);
        let place = &response.results[0];
        assert_eq!(place.name, "San Francisco");
        assert_eq!(place.population, Some(864_816));
        assert_eq!(place.postcodes.len(), 2);
        assert_eq!(place.timezone.as_deref(), Some("America/Los_Angeles"));
    }

    #[test]
    fn test_missing_results_is_empty() {
        let response: GeocodingResponse =
            serde_json::from_str(r#"{"generationtime_ms": 0.5}"#).unwrap();
        assert!(response.is_empty());
    }

    #[test]
    fn test_display_name() {
        let response: GeocodingResponse = serde_json::from_str(SAN_FRANCISCO).unwrap();
        assert_eq!(
            response.results[0].display_name(),
            "San Francisco, California, United States"
        );
        let bare = Place {
            name: "Nowhere".to_string(),
            ..Place::default()
        };
        assert_eq!(bare.display_name(), "Nowhere");
    }
}
