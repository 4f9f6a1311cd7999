//! Reference documentation for the validation stage
//!
//! The validator cross-checks parameters against the published geocoding API
//! documentation. The page text is opaque to the pipeline; when it cannot be
//! fetched the built-in reference notes are used instead.

use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use scraper::Html;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use crate::config::DocsConfig;
use crate::telemetry::{self, CallDetail, CallEvent};
use crate::{CityScoutError, Result};

/// Open-Meteo geocoding API documentation page
pub const GEOCODING_DOCS_URL: &str = "https://open-meteo.com/en/docs/geocoding-api";

/// Rules of the search endpoint, always available to the validator
pub const REFERENCE_NOTES: &str = "\
Open-Meteo Geocoding API search endpoint: GET https://geocoding-api.open-meteo.com/v1/search
Parameters:
- name (required): string to search for. Must be at least 2 characters to match anything useful.
- count (optional): number of results to return, default 10, allowed range 1..100.
- language (optional): lower-cased IETF language tag for translated results, default en.
- countryCode (optional): ISO-3166-1 alpha-2 country code to filter results.
- format (optional): json or protobuf, default json.";

// Elements whose text never reaches the reader
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Source of reference documentation text
#[async_trait]
pub trait DocumentationSource: Send + Sync {
    async fn fetch_reference(&self) -> Result<String>;
}

/// Fixed reference text
pub struct StaticReference(pub String);

impl Default for StaticReference {
    fn default() -> Self {
        Self(REFERENCE_NOTES.to_string())
    }
}

#[async_trait]
impl DocumentationSource for StaticReference {
    async fn fetch_reference(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Fetches the documentation page over HTTP, retrying transient failures
pub struct HttpDocumentationFetcher {
    client: ClientWithMiddleware,
    url: String,
    max_chars: usize,
}

impl HttpDocumentationFetcher {
    pub fn new(config: &DocsConfig) -> Result<Self> {
        let base = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(concat!("CityScout/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CityScoutError::api(format!("Failed to create HTTP client: {e}")))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(base)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            url: config.url.clone(),
            max_chars: config.max_chars,
        })
    }
}

#[async_trait]
impl DocumentationSource for HttpDocumentationFetcher {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_reference(&self) -> Result<String> {
        let start = Instant::now();
        let response = self.client.get(&self.url).send().await;

        let status = response.as_ref().ok().map(|r| r.status());
        let outcome = match response {
            Ok(response) if response.status().is_success() => response
                .text()
                .await
                .map_err(|e| CityScoutError::api(format!("Failed to read documentation page: {e}"))),
            Ok(response) => Err(CityScoutError::api(format!(
                "Documentation page returned HTTP {}",
                response.status()
            ))),
            Err(e) => Err(CityScoutError::api(format!(
                "Failed to fetch documentation page: {e}"
            ))),
        };

        telemetry::record_call(&CallEvent {
            stage: "documentation",
            latency: start.elapsed(),
            detail: CallDetail::Http {
                status: status.map(|s| s.as_u16()),
            },
            success: outcome.is_ok(),
        });

        let text = extract_text(&outcome?, self.max_chars);
        debug!(chars = text.len(), "Fetched documentation page");
        Ok(text)
    }
}

/// Reduce an HTML page to its visible text, at most `max_chars` characters
#[must_use]
pub fn extract_text(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let words = document
        .root_element()
        .descendants()
        .filter(|node| {
            !node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|element| HIDDEN_ELEMENTS.contains(&element.name()))
            })
        })
        .filter_map(|node| node.value().as_text().map(|text| &**text))
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>();
    words.join(" ").chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve_once;

    fn docs_config(url: String) -> DocsConfig {
        DocsConfig {
            url,
            max_retries: 0,
            timeout_seconds: 5,
            ..DocsConfig::default()
        }
    }

    #[test]
    fn test_extract_text_strips_markup() {
        let html = r#"<html><head><style>body { color: red; }</style>
            <script type="text/javascript">var x = "<b>";</script></head>
            <body><h1>Geocoding&nbsp;API</h1><p>count: 1 &amp; 100</p></body></html>"#;
        assert_eq!(extract_text(html, 1000), "Geocoding API count: 1 & 100");
    }

    #[test]
    fn test_extract_text_ignores_markup_inside_attributes() {
        let html = r#"<p><a title="a>b" href="x">count</a> 1..100</p>"#;
        assert_eq!(extract_text(html, 1000), "count 1..100");
    }

    #[test]
    fn test_extract_text_decodes_entities() {
        let html = "<p>count&#x3A; 1&#8211;100 &mdash; default&#160;10</p>";
        assert_eq!(
            extract_text(html, 1000),
            "count: 1\u{2013}100 \u{2014} default 10"
        );
    }

    #[test]
    fn test_extract_text_truncates() {
        let html = "<p>abcdefghij</p>";
        assert_eq!(extract_text(html, 4), "abcd");
    }

    #[test]
    fn test_reference_notes_cover_parameters() {
        for parameter in ["name", "count", "language", "countryCode", "1..100"] {
            assert!(REFERENCE_NOTES.contains(parameter), "missing {parameter}");
        }
    }

    #[tokio::test]
    async fn test_static_reference() {
        let source = StaticReference::default();
        assert_eq!(source.fetch_reference().await.unwrap(), REFERENCE_NOTES);
    }

    #[test]
    fn test_http_fetcher_builds_from_config() {
        let fetcher = HttpDocumentationFetcher::new(&DocsConfig::default()).unwrap();
        assert_eq!(fetcher.url, GEOCODING_DOCS_URL);
        assert_eq!(fetcher.max_chars, 12_000);
    }

    #[tokio::test]
    async fn test_http_fetcher_extracts_page_text() {
        let url = serve_once(
            "200 OK",
            "text/html",
            "<html><body><h2>Parameters</h2><p>count: 1..100</p><script>track()</script></body></html>",
        )
        .await;
        let fetcher = HttpDocumentationFetcher::new(&docs_config(url)).unwrap();

        let text = fetcher.fetch_reference().await.unwrap();
        assert_eq!(text, "Parameters count: 1..100");
    }

    #[tokio::test]
    async fn test_http_fetcher_fails_on_not_found() {
        let url = serve_once("404 Not Found", "text/plain", "missing").await;
        let fetcher = HttpDocumentationFetcher::new(&docs_config(url)).unwrap();

        let result = fetcher.fetch_reference().await;
        match result {
            Err(CityScoutError::Api { message }) => assert!(message.contains("404")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
