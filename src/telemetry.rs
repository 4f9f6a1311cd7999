//! Logging and observability
//!
//! Installs the `tracing` subscriber, optionally wires OpenTelemetry export
//! over OTLP/HTTP, and records one observability event per generation or
//! network call. Recording is fire-and-forget: it never fails and never
//! aborts the pipeline.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{CityScoutConfig, TelemetryConfig};
use crate::llm::TokenUsage;

const INSTRUMENTATION_NAME: &str = "cityscout";

// Exporter and HTTP client internals would otherwise feed their own logs
// back into the OTLP log bridge.
const QUIET_DEPENDENCIES: &str = "hyper=warn,hyper_util=warn,reqwest=warn,h2=warn,opentelemetry=warn,opentelemetry_sdk=warn,opentelemetry_otlp=warn";

/// One generation or network call as seen by the observability collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallEvent {
    /// Stage or client that made the call
    pub stage: &'static str,
    pub latency: Duration,
    pub detail: CallDetail,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDetail {
    Tokens(TokenUsage),
    /// `None` when no response was received
    Http { status: Option<u16> },
}

struct Instruments {
    duration: Histogram<f64>,
    tokens: Counter<u64>,
}

static INSTRUMENTS: LazyLock<Instruments> = LazyLock::new(|| {
    let meter = global::meter(INSTRUMENTATION_NAME);
    Instruments {
        duration: meter
            .f64_histogram("cityscout.call.duration")
            .with_unit("s")
            .with_description("Latency of generation and network calls")
            .build(),
        tokens: meter
            .u64_counter("cityscout.llm.tokens")
            .with_description("Tokens consumed by generation calls")
            .build(),
    }
});

/// Record a call. Without an installed meter provider the metric side is a
/// no-op; the structured log event is always emitted.
pub fn record_call(event: &CallEvent) {
    let latency_ms = u64::try_from(event.latency.as_millis()).unwrap_or(u64::MAX);
    let attributes = [
        KeyValue::new("stage", event.stage),
        KeyValue::new("success", event.success),
    ];
    INSTRUMENTS
        .duration
        .record(event.latency.as_secs_f64(), &attributes);

    match event.detail {
        CallDetail::Tokens(usage) => {
            for (direction, count) in [("input", usage.input_tokens), ("output", usage.output_tokens)] {
                INSTRUMENTS.tokens.add(
                    u64::from(count),
                    &[
                        KeyValue::new("stage", event.stage),
                        KeyValue::new("direction", direction),
                    ],
                );
            }
            info!(
                stage = event.stage,
                latency_ms,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                success = event.success,
                "generation call"
            );
        }
        CallDetail::Http { status } => {
            info!(
                stage = event.stage,
                latency_ms,
                http_status = status,
                success = event.success,
                "http call"
            );
        }
    }
}

struct Providers {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl Providers {
    fn build(config: &TelemetryConfig) -> Result<Self> {
        let endpoint = config.otlp_endpoint.trim_end_matches('/');
        let resource = Resource::builder()
            .with_service_name(config.service_name.clone())
            .with_attribute(KeyValue::new(SERVICE_VERSION, crate::VERSION))
            .build();

        let span_exporter = SpanExporter::builder()
            .with_http()
            .with_endpoint(format!("{endpoint}/v1/traces"))
            .build()
            .context("Failed to build OTLP span exporter")?;
        let tracer = SdkTracerProvider::builder()
            .with_batch_exporter(span_exporter)
            .with_resource(resource.clone())
            .build();

        let metric_exporter = MetricExporter::builder()
            .with_http()
            .with_endpoint(format!("{endpoint}/v1/metrics"))
            .build()
            .context("Failed to build OTLP metric exporter")?;
        let meter = SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(metric_exporter).build())
            .with_resource(resource.clone())
            .build();

        let log_exporter = LogExporter::builder()
            .with_http()
            .with_endpoint(format!("{endpoint}/v1/logs"))
            .build()
            .context("Failed to build OTLP log exporter")?;
        let logger = SdkLoggerProvider::builder()
            .with_batch_exporter(log_exporter)
            .with_resource(resource)
            .build();

        global::set_tracer_provider(tracer.clone());
        global::set_meter_provider(meter.clone());

        Ok(Self {
            tracer,
            meter,
            logger,
        })
    }
}

/// Flushes and shuts down exporters when the run ends
pub struct TelemetryGuard {
    providers: Option<Providers>,
}

impl TelemetryGuard {
    /// Whether OTLP export is active
    #[must_use]
    pub fn is_exporting(&self) -> bool {
        self.providers.is_some()
    }

    pub fn shutdown(self) {
        let Some(providers) = self.providers else {
            return;
        };
        if let Err(e) = providers.tracer.shutdown() {
            eprintln!("Failed to flush traces: {e}");
        }
        if let Err(e) = providers.meter.shutdown() {
            eprintln!("Failed to flush metrics: {e}");
        }
        if let Err(e) = providers.logger.shutdown() {
            eprintln!("Failed to flush logs: {e}");
        }
    }
}

/// Install the global subscriber. Must be called outside the async runtime
/// so the OTLP exporters can create their blocking HTTP clients.
pub fn init(config: &CityScoutConfig, verbose: bool) -> TelemetryGuard {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},{QUIET_DEPENDENCIES}")));

    let (providers, export_error) = if config.telemetry.enabled {
        match Providers::build(&config.telemetry) {
            Ok(providers) => (Some(providers), None),
            Err(e) => (None, Some(e)),
        }
    } else {
        (None, None)
    };

    let json = config.logging.format == "json";
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let pretty_layer = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let trace_layer = providers.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer.tracer(INSTRUMENTATION_NAME))
    });
    let log_layer = providers
        .as_ref()
        .map(|p| OpenTelemetryTracingBridge::new(&p.logger));

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .with(trace_layer)
        .with(log_layer)
        .try_init()
    {
        eprintln!("Failed to initialize logging: {e}");
    }

    if let Some(e) = export_error {
        warn!(error = %format!("{e:#}"), "OTLP export disabled, continuing with console logging");
    } else if providers.is_some() {
        info!(endpoint = %config.telemetry.otlp_endpoint, "OTLP export enabled");
    }

    TelemetryGuard { providers }
}
