use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use cityscout::pipeline::{PipelineOrchestrator, PipelineReport, PipelineState};
use cityscout::{CityScoutConfig, CityScoutError, telemetry};

const EXIT_FAILED: u8 = 1;
const EXIT_REJECTED: u8 = 2;
const EXIT_STARTUP: u8 = 3;

/// Ask about a city and get a short, grounded overview
#[derive(Debug, Parser)]
#[command(name = "cityscout", version, about)]
struct Cli {
    /// Question about a city, e.g. "Tell me about Paris"
    #[arg(env = "CITY_QUERY")]
    query: Option<String>,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the full run report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match CityScoutConfig::load_from_path(cli.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    // The OTLP exporters build blocking clients, so this runs before the runtime exists.
    let guard = telemetry::init(&config, cli.verbose);

    let code = match run(&cli, &config) {
        Ok(report) => {
            print_report(&report, cli.json);
            exit_code(report.final_state())
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "Startup failed");
            match e.downcast_ref::<CityScoutError>() {
                Some(app_error) => eprintln!("{}", app_error.user_message()),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::from(EXIT_STARTUP)
        }
    };

    if guard.is_exporting() {
        info!("Flushing telemetry exporters");
    }
    guard.shutdown();
    code
}

fn run(cli: &Cli, config: &CityScoutConfig) -> anyhow::Result<PipelineReport> {
    config.require_api_key()?;
    let orchestrator =
        PipelineOrchestrator::from_config(config).context("Failed to set up the pipeline")?;

    let query = cli
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or(&config.pipeline.default_query)
        .to_string();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    info!(query = %query, "Starting city information workflow");
    let report = runtime.block_on(orchestrator.run(&query));
    info!(state = %report.final_state(), attempts = ?report.attempts, "Workflow finished");
    Ok(report)
}

fn print_report(report: &PipelineReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Failed to serialize report: {e}"),
        }
        return;
    }

    let text = report.outcome.user_output();
    if report.final_state() == PipelineState::Failed {
        eprintln!("{text}");
    } else {
        println!("{text}");
    }
}

fn exit_code(state: PipelineState) -> ExitCode {
    match state {
        PipelineState::Rejected => ExitCode::from(EXIT_REJECTED),
        PipelineState::Failed => ExitCode::from(EXIT_FAILED),
        _ => ExitCode::SUCCESS,
    }
}
