//! Configuration management for `CityScout`
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::CityScoutError;
use crate::llm::Role;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure, built once at startup and passed to the
/// orchestrator and the generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CityScoutConfig {
    /// Text-generation provider settings
    #[serde(default)]
    pub llm: LlmConfig,
    /// Geocoding API settings
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    /// Reference documentation retrieval settings
    #[serde(default)]
    pub docs: DocsConfig,
    /// Retry bounds and default query
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// OpenTelemetry export configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Text-generation provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Gemini API key; falls back to `GEMINI_API_KEY`
    pub api_key: Option<String>,
    /// Model identifier
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Base URL of the generative language API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u32,
    /// Sampling temperature per stage role
    #[serde(default)]
    pub temperatures: TemperatureConfig,
}

/// Sampling temperature for each stage role
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TemperatureConfig {
    #[serde(default = "default_temperature_gatekeeper")]
    pub gatekeeper: f32,
    #[serde(default = "default_temperature_extractor")]
    pub extractor: f32,
    #[serde(default = "default_temperature_validator")]
    pub validator: f32,
    #[serde(default = "default_temperature_summarizer")]
    pub summarizer: f32,
}

/// Geocoding API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    /// Base URL for the geocoding API
    #[serde(default = "default_geocoding_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_geocoding_timeout")]
    pub timeout_seconds: u32,
}

/// Reference documentation retrieval settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsConfig {
    /// Fetch the live documentation page; built-in notes are used otherwise
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Documentation page URL
    #[serde(default = "default_docs_url")]
    pub url: String,
    /// Request timeout in seconds
    #[serde(default = "default_docs_timeout")]
    pub timeout_seconds: u32,
    /// Retries for transient failures
    #[serde(default = "default_docs_max_retries")]
    pub max_retries: u32,
    /// Maximum characters of page text handed to the validator
    #[serde(default = "default_docs_max_chars")]
    pub max_chars: usize,
}

/// Retry bounds and default query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Query used when none is given on the command line
    #[serde(default = "default_query")]
    pub default_query: String,
    /// Attempts for parameter extraction
    #[serde(default = "default_attempts")]
    pub extraction_attempts: u32,
    /// Attempts for parameter validation
    #[serde(default = "default_attempts")]
    pub validation_attempts: u32,
    /// Attempts for the geocoding request
    #[serde(default = "default_attempts")]
    pub fetch_attempts: u32,
    /// Wait between geocoding attempts, in milliseconds
    #[serde(default = "default_fetch_backoff_ms")]
    pub fetch_backoff_ms: u64,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// OpenTelemetry export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Export traces, logs and metrics over OTLP
    #[serde(default)]
    pub enabled: bool,
    /// OTLP/HTTP collector endpoint
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,
    /// Service name reported to the collector
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_llm_timeout() -> u32 {
    30
}

fn default_temperature_gatekeeper() -> f32 {
    0.3
}

fn default_temperature_extractor() -> f32 {
    0.1
}

fn default_temperature_validator() -> f32 {
    0.1
}

fn default_temperature_summarizer() -> f32 {
    0.7
}

fn default_geocoding_base_url() -> String {
    "https://geocoding-api.open-meteo.com/v1".to_string()
}

fn default_geocoding_timeout() -> u32 {
    15
}

fn default_true() -> bool {
    true
}

fn default_docs_url() -> String {
    crate::docs::GEOCODING_DOCS_URL.to_string()
}

fn default_docs_timeout() -> u32 {
    15
}

fn default_docs_max_retries() -> u32 {
    2
}

fn default_docs_max_chars() -> usize {
    12_000
}

fn default_query() -> String {
    "Tell me about San Francisco".to_string()
}

fn default_attempts() -> u32 {
    3
}

fn default_fetch_backoff_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_otlp_endpoint() -> String {
    "http://127.0.0.1:4318".to_string()
}

fn default_service_name() -> String {
    "cityscout".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            timeout_seconds: default_llm_timeout(),
            temperatures: TemperatureConfig::default(),
        }
    }
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            gatekeeper: default_temperature_gatekeeper(),
            extractor: default_temperature_extractor(),
            validator: default_temperature_validator(),
            summarizer: default_temperature_summarizer(),
        }
    }
}

impl TemperatureConfig {
    /// Temperature used for a given stage role
    #[must_use]
    pub fn for_role(&self, role: Role) -> f32 {
        match role {
            Role::Gatekeeper => self.gatekeeper,
            Role::Extractor => self.extractor,
            Role::Validator => self.validator,
            Role::Summarizer => self.summarizer,
        }
    }

    fn all(&self) -> [(Role, f32); 4] {
        [
            (Role::Gatekeeper, self.gatekeeper),
            (Role::Extractor, self.extractor),
            (Role::Validator, self.validator),
            (Role::Summarizer, self.summarizer),
        ]
    }
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: default_geocoding_base_url(),
            timeout_seconds: default_geocoding_timeout(),
        }
    }
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            url: default_docs_url(),
            timeout_seconds: default_docs_timeout(),
            max_retries: default_docs_max_retries(),
            max_chars: default_docs_max_chars(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_query: default_query(),
            extraction_attempts: default_attempts(),
            validation_attempts: default_attempts(),
            fetch_attempts: default_attempts(),
            fetch_backoff_ms: default_fetch_backoff_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: default_otlp_endpoint(),
            service_name: default_service_name(),
        }
    }
}

impl CityScoutConfig {
    /// Load configuration from the given file, or the default location when
    /// `None`, then apply environment overrides
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // CITYSCOUT_LLM__API_KEY -> llm.api_key
        builder = builder.add_source(
            Environment::with_prefix("CITYSCOUT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: CityScoutConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        if config.llm.api_key.is_none() {
            config.llm.api_key = std::env::var("GEMINI_API_KEY").ok();
        }

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cityscout").join("config.toml"))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.llm.model.is_empty() {
            self.llm.model = default_llm_model();
        }
        if self.llm.base_url.is_empty() {
            self.llm.base_url = default_llm_base_url();
        }
        if self.llm.timeout_seconds == 0 {
            self.llm.timeout_seconds = default_llm_timeout();
        }
        if self.geocoding.base_url.is_empty() {
            self.geocoding.base_url = default_geocoding_base_url();
        }
        if self.geocoding.timeout_seconds == 0 {
            self.geocoding.timeout_seconds = default_geocoding_timeout();
        }
        if self.docs.url.is_empty() {
            self.docs.url = default_docs_url();
        }
        if self.docs.timeout_seconds == 0 {
            self.docs.timeout_seconds = default_docs_timeout();
        }
        if self.docs.max_chars == 0 {
            self.docs.max_chars = default_docs_max_chars();
        }
        if self.pipeline.default_query.trim().is_empty() {
            self.pipeline.default_query = default_query();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
        if self.telemetry.otlp_endpoint.is_empty() {
            self.telemetry.otlp_endpoint = default_otlp_endpoint();
        }
        if self.telemetry.service_name.is_empty() {
            self.telemetry.service_name = default_service_name();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// The API key needed to run the pipeline
    pub fn require_api_key(&self) -> std::result::Result<&str, CityScoutError> {
        match self.llm.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(CityScoutError::config(
                "Missing Gemini API key. Set GEMINI_API_KEY or llm.api_key",
            )),
        }
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.llm.timeout_seconds > 300 {
            return Err(CityScoutError::config("LLM timeout cannot exceed 300 seconds").into());
        }

        if self.geocoding.timeout_seconds > 300 {
            return Err(
                CityScoutError::config("Geocoding timeout cannot exceed 300 seconds").into(),
            );
        }

        if self.docs.max_retries > 10 {
            return Err(CityScoutError::config("Docs max retries cannot exceed 10").into());
        }

        let bounds = [
            ("extraction_attempts", self.pipeline.extraction_attempts),
            ("validation_attempts", self.pipeline.validation_attempts),
            ("fetch_attempts", self.pipeline.fetch_attempts),
        ];
        for (name, value) in bounds {
            if !(1..=10).contains(&value) {
                return Err(CityScoutError::config(format!(
                    "pipeline.{name} must be between 1 and 10, got {value}"
                ))
                .into());
            }
        }

        if self.pipeline.fetch_backoff_ms > 60_000 {
            return Err(
                CityScoutError::config("Fetch backoff cannot exceed 60000 ms").into(),
            );
        }

        for (role, temperature) in self.llm.temperatures.all() {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(CityScoutError::config(format!(
                    "Temperature for {role} must be between 0.0 and 2.0, got {temperature}"
                ))
                .into());
            }
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(CityScoutError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(CityScoutError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        let urls = [
            ("llm.base_url", &self.llm.base_url),
            ("geocoding.base_url", &self.geocoding.base_url),
            ("docs.url", &self.docs.url),
            ("telemetry.otlp_endpoint", &self.telemetry.otlp_endpoint),
        ];
        for (name, url) in urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(CityScoutError::config(format!(
                    "{name} must be a valid HTTP or HTTPS URL"
                ))
                .into());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = CityScoutConfig::default();
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(
            config.geocoding.base_url,
            "https://geocoding-api.open-meteo.com/v1"
        );
        assert_eq!(config.geocoding.timeout_seconds, 15);
        assert_eq!(config.pipeline.validation_attempts, 3);
        assert_eq!(config.pipeline.default_query, "Tell me about San Francisco");
        assert_eq!(config.logging.level, "info");
        assert!(!config.telemetry.enabled);
        assert!(config.llm.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_temperature_per_role() {
        let temperatures = TemperatureConfig::default();
        assert_eq!(temperatures.for_role(Role::Gatekeeper), 0.3);
        assert_eq!(temperatures.for_role(Role::Extractor), 0.1);
        assert_eq!(temperatures.for_role(Role::Validator), 0.1);
        assert_eq!(temperatures.for_role(Role::Summarizer), 0.7);
    }

    #[test]
    fn test_require_api_key() {
        let mut config = CityScoutConfig::default();
        assert!(config.require_api_key().is_err());

        config.llm.api_key = Some("   ".to_string());
        assert!(config.require_api_key().is_err());

        config.llm.api_key = Some("test-key".to_string());
        assert_eq!(config.require_api_key().unwrap(), "test-key");
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = CityScoutConfig::default();
        config.logging.level = "invalid".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_config_validation_retry_bounds() {
        let mut config = CityScoutConfig::default();
        config.pipeline.fetch_attempts = 0;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("fetch_attempts"));

        config.pipeline.fetch_attempts = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_temperature_range() {
        let mut config = CityScoutConfig::default();
        config.llm.temperatures.summarizer = 2.5;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("summarizer"));
    }

    #[test]
    fn test_config_validation_urls() {
        let mut config = CityScoutConfig::default();
        config.geocoding.base_url = "ftp://example.com".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("geocoding.base_url"));
    }

    #[test]
    fn test_apply_defaults_fills_empty_values() {
        let mut config = CityScoutConfig::default();
        config.llm.model = String::new();
        config.pipeline.default_query = "  ".to_string();
        config.apply_defaults();
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.pipeline.default_query, "Tell me about San Francisco");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[llm]
api_key = "file-key"
model = "gemini-2.5-flash"

[llm.temperatures]
summarizer = 0.5

[pipeline]
fetch_attempts = 2
fetch_backoff_ms = 10
"#
        )
        .unwrap();

        let config = CityScoutConfig::load_from_path(Some(path)).unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("file-key"));
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        assert_eq!(config.llm.temperatures.summarizer, 0.5);
        assert_eq!(config.llm.temperatures.gatekeeper, 0.3);
        assert_eq!(config.pipeline.fetch_attempts, 2);
        assert_eq!(config.pipeline.fetch_backoff_ms, 10);
        assert_eq!(config.pipeline.extraction_attempts, 3);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[logging]\nformat = \"xml\"\n").unwrap();

        let result = CityScoutConfig::load_from_path(Some(path));
        assert!(result.is_err());
        assert!(format!("{:#}", result.unwrap_err()).contains("Invalid log format"));
    }

    #[test]
    fn test_config_path_generation() {
        if let Some(path) = CityScoutConfig::get_config_path() {
            assert!(path.to_string_lossy().contains("cityscout"));
            assert!(path.to_string_lossy().contains("config.toml"));
        }
    }
}
