mod config;
mod error;
mod heal;
mod ingest;
mod live;
mod pipeline;
mod providers;
mod triage;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::{ConfigManager, HealerConfig};
use ingest::IngestMode;
use live::WebDriverBrowser;
use pipeline::{Pipeline, PipelineOutcome};
use providers::create_provider;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// CLI Argument Parsing
// ============================================================================

#[derive(Parser)]
#[command(
    name = "locator-healer",
    version,
    about = "Repairs stale UI locators in page objects after a failed test run"
)]
struct Cli {
    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Read configuration from this file instead of the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Only consider the first failed step of the run report
    #[arg(long, global = true)]
    first_failure: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick a repair path from the available inputs and run it (default)
    Run,
    /// Ingest the run report and write the repair artifacts only
    Context,
    /// Repair page objects from a previously written repair manifest
    Repair,
    /// Verify candidate locators against the live page and repair them
    Live,
    /// Classify an error message
    Classify {
        /// The error text to classify
        text: String,
    },
    /// Print the resolved configuration
    Config,
}

/// JSON envelope for non-interactive output
fn json_output(success: bool, data: serde_json::Value, error: Option<&str>) -> String {
    serde_json::json!({
        "success": success,
        "data": data,
        "error": error,
    })
    .to_string()
}

fn fail(json_mode: bool, message: &str) -> ! {
    if json_mode {
        println!("{}", json_output(false, serde_json::Value::Null, Some(message)));
    } else {
        eprintln!("Error: {}", message);
    }
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    // Check for --json flag before initializing logging
    let json_mode = std::env::args().any(|arg| arg == "--json");

    // Initialize structured logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("locator_healer=info"));

    if json_mode {
        // In JSON mode: send logs to stderr with no ANSI colors
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    } else if std::env::var("HEALER_LOG_JSON").is_ok() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }

    let cli = Cli::parse();

    let mut config = match ConfigManager::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(cli.json, &e.to_string()),
    };
    if cli.first_failure {
        config.mode = IngestMode::FirstFailure;
    }

    run_command(cli.command.unwrap_or(Commands::Run), &config, cli.json).await
}

// ============================================================================
// Command Runner
// ============================================================================

fn connect(config: &HealerConfig) -> error::Result<Arc<dyn providers::Provider>> {
    create_provider(config)
}

fn browser(config: &HealerConfig) -> error::Result<Arc<dyn live::Browser>> {
    Ok(Arc::new(WebDriverBrowser::new(
        &config.live.webdriver_url,
        config.service.timeout_secs,
    )?))
}

async fn run_command(command: Commands, config: &HealerConfig, json_mode: bool) -> Result<()> {
    let pipeline = Pipeline::new(config);

    match command {
        Commands::Run => {
            let browser = match browser(config) {
                Ok(browser) => browser,
                Err(e) => fail(json_mode, &e.to_string()),
            };
            match pipeline.run(browser, connect).await {
                Ok(outcome) => report_outcome(&outcome, json_mode)?,
                Err(e) => fail(json_mode, &e.to_string()),
            }
        }
        Commands::Context => match pipeline.context().await {
            Ok(Some(context)) => {
                if json_mode {
                    println!("{}", json_output(true, serde_json::to_value(&context.manifest)?, None));
                } else {
                    println!(
                        "{} healable failure(s), {} page object(s) to repair",
                        context.manifest.total_failures,
                        context.manifest.files.len()
                    );
                }
            }
            Ok(None) => {
                if json_mode {
                    println!("{}", json_output(true, serde_json::Value::Null, None));
                } else {
                    println!("Nothing to heal.");
                }
            }
            Err(e) => fail(json_mode, &e.to_string()),
        },
        Commands::Repair => match pipeline.repair(connect).await {
            Ok(Some(summary)) => {
                if json_mode {
                    println!("{}", json_output(summary.is_success(), serde_json::to_value(&summary)?, None));
                } else {
                    print_summary(&summary);
                }
                if !summary.is_success() {
                    std::process::exit(1);
                }
            }
            Ok(None) => {
                if json_mode {
                    println!("{}", json_output(true, serde_json::Value::Null, None));
                } else {
                    println!("No repair manifest found.");
                }
            }
            Err(e) => fail(json_mode, &e.to_string()),
        },
        Commands::Live => {
            let browser = match browser(config) {
                Ok(browser) => browser,
                Err(e) => fail(json_mode, &e.to_string()),
            };
            match pipeline.live(browser, connect).await {
                Ok(report) => {
                    if json_mode {
                        println!("{}", json_output(true, serde_json::to_value(&report)?, None));
                    } else {
                        print_live(&report);
                    }
                }
                Err(e) => fail(json_mode, &e.to_string()),
            }
        }
        Commands::Classify { text } => {
            let classification = triage::classify(&text);
            if json_mode {
                println!("{}", json_output(true, serde_json::to_value(classification)?, None));
            } else {
                println!(
                    "{} ({})",
                    classification.category,
                    if classification.healable { "healable" } else { "not healable" }
                );
            }
        }
        Commands::Config => match config.to_redacted_toml() {
            Ok(rendered) => {
                if json_mode {
                    println!("{}", json_output(true, serde_json::to_value(config.redacted())?, None));
                } else {
                    print!("{}", rendered);
                }
            }
            Err(e) => fail(json_mode, &e.to_string()),
        },
    }

    Ok(())
}

fn report_outcome(outcome: &PipelineOutcome, json_mode: bool) -> Result<()> {
    if json_mode {
        println!("{}", json_output(outcome.is_success(), serde_json::to_value(outcome)?, None));
    } else if let Some(summary) = &outcome.summary {
        print_summary(summary);
    } else if let Some(report) = &outcome.live {
        print_live(report);
    } else {
        println!("Nothing to heal.");
    }

    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(summary: &heal::HealSummary) {
    println!(
        "Healed {}/{} page object(s) for {} failure(s)",
        summary.files_healed, summary.files_processed, summary.total_failures
    );
    for result in &summary.results {
        match &result.error {
            None => println!("  ok    {} ({})", result.file, result.locators.join(", ")),
            Some(error) => println!("  FAIL  {}: {}", result.file, error),
        }
    }
}

fn print_live(report: &live::LiveReport) {
    let Some(file) = &report.file else {
        println!("No failure note found.");
        return;
    };
    println!("{}: {} candidate locator(s)", file, report.candidates.len());
    for candidate in &report.candidates {
        let status = if candidate.present { "present" } else { "broken" };
        match &candidate.replacement {
            Some(replacement) => println!(
                "  {:<8} {} -> {} (confidence {:.1}, {})",
                status,
                candidate.original,
                replacement,
                candidate.confidence,
                if candidate.accepted { "applied" } else { "rejected" }
            ),
            None => println!("  {:<8} {}", status, candidate.original),
        }
    }
}
