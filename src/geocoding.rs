//! Geocoding API client for Open-Meteo
//!
//! One call is one HTTP attempt; retry and backoff belong to the pipeline.

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::GeocodingConfig;
use crate::error::FetchError;
use crate::models::{GeoSearchParams, GeocodingResponse};
use crate::telemetry::{self, CallDetail, CallEvent};
use crate::{CityScoutError, Result};

const MAX_ERROR_BODY: usize = 500;

/// A geocoding search backend
#[async_trait]
pub trait GeocodingApi: Send + Sync {
    /// Run one search request. An empty result set is a successful response.
    async fn search(
        &self,
        params: &GeoSearchParams,
    ) -> std::result::Result<GeocodingResponse, FetchError>;
}

/// Build the search URL. Absent optional parameters are omitted.
#[must_use]
pub fn search_url(base_url: &str, params: &GeoSearchParams) -> String {
    let query = params
        .query_pairs()
        .into_iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(&value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}/search?{query}", base_url.trim_end_matches('/'))
}

/// Client for `geocoding-api.open-meteo.com`
pub struct OpenMeteoGeocoder {
    client: Client,
    base_url: String,
}

impl OpenMeteoGeocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(concat!("CityScout/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CityScoutError::api(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    async fn request(
        &self,
        url: &str,
    ) -> (Option<u16>, std::result::Result<GeocodingResponse, FetchError>) {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return (None, Err(FetchError::Network(e.to_string()))),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return (
                Some(status.as_u16()),
                Err(FetchError::Status {
                    status: status.as_u16(),
                    body: body.chars().take(MAX_ERROR_BODY).collect(),
                }),
            );
        }

        let parsed = response
            .json::<GeocodingResponse>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()));
        (Some(status.as_u16()), parsed)
    }
}

#[async_trait]
impl GeocodingApi for OpenMeteoGeocoder {
    #[instrument(skip(self), fields(name = %params.name))]
    async fn search(
        &self,
        params: &GeoSearchParams,
    ) -> std::result::Result<GeocodingResponse, FetchError> {
        let url = search_url(&self.base_url, params);
        debug!("Geocoding request URL: {}", url);

        let start = Instant::now();
        let (status, result) = self.request(&url).await;
        let elapsed = start.elapsed();

        telemetry::record_call(&CallEvent {
            stage: "geocoding",
            latency: elapsed,
            detail: CallDetail::Http { status },
            success: result.is_ok(),
        });

        match &result {
            Ok(response) if response.is_empty() => {
                warn!("No results found for '{}'", params.name);
            }
            Ok(response) => {
                info!(
                    "Found {} geocoding results for '{}' in {:.3}s",
                    response.len(),
                    params.name,
                    elapsed.as_secs_f64()
                );
            }
            Err(e) => warn!("Geocoding request failed: {}", e),
        }

        result
    }
}
