//! UPH Analyzer CLI
//!
//! Cleans raw UPH measurements and writes an efficiency report workbook.
//!
//! # Usage
//!
//! ```bash
//! # One CSV export, report into ./reports
//! uph-analyzer run --source uph_2024.csv --output-dir reports
//!
//! # Several monthly exports, February only
//! uph-analyzer run --source jan.xlsx --source feb.xlsx --output-dir reports \
//!     --start 2024-02-01 --end 2024-02-29
//!
//! # Remote MES API
//! uph-analyzer run --source https://mes.example/api/uph --output-dir reports
//!
//! # What dates does a source cover?
//! uph-analyzer preview-dates --source uph_2024.csv
//! ```
//!
//! # Environment Variables
//!
//! - `UPH_ANALYZER_CONFIG`: Path to a TOML config file
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use uph_analyzer::{
    preview_date_range, run_pipeline_with_summary, AnalyzerConfig, DateWindow, ReferenceLocator,
    RunContext, Source, TracingProgress,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "uph-analyzer")]
#[command(about = "UPH outlier cleaning and efficiency reporting")]
#[command(version)]
struct CliArgs {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Path to a TOML config file (overrides the standard search order)
    #[arg(long, global = true, value_name = "TOML")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clean, aggregate and export a report
    Run {
        /// Input file(s) or a single http(s) URL. Repeat for several files.
        #[arg(long = "source", required = true, value_name = "PATH|URL")]
        sources: Vec<String>,

        /// Directory the report is written to
        #[arg(long, value_name = "DIR")]
        output_dir: PathBuf,

        /// First calendar date to include (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Last calendar date to include (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Reference (wire) table, instead of scanning the search directory
        #[arg(long, value_name = "PATH")]
        reference: Option<PathBuf>,
    },

    /// Print the date coverage of a source as JSON
    PreviewDates {
        #[arg(long = "source", required = true, value_name = "PATH|URL")]
        sources: Vec<String>,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

// ============================================================================
// Setup
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<AnalyzerConfig> {
    match path {
        Some(p) => AnalyzerConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config {}", p.display())),
        None => Ok(AnalyzerConfig::load()),
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_run(
    config: AnalyzerConfig,
    sources: &[String],
    output_dir: PathBuf,
    start: Option<&str>,
    end: Option<&str>,
    reference: Option<PathBuf>,
) -> Result<()> {
    let source = Source::from_inputs(sources).context("Invalid --source")?;
    let window = DateWindow::parse(start, end).context("Invalid date bound")?;

    let mut ctx = RunContext::new(config).with_progress(TracingProgress);
    if let Some(path) = reference {
        ctx = ctx.with_reference(ReferenceLocator::Explicit(path));
    }

    let summary = run_pipeline_with_summary(&ctx, &source, &output_dir, &window)
        .await
        .with_context(|| format!("Run failed for {}", source.describe()))?;

    info!(
        groups = summary.total_groups,
        data_points = summary.total_data_points,
        outliers_removed = summary.total_outliers_removed,
        average_efficiency = summary.average_efficiency,
        data_quality = summary.data_quality_percent,
        "Run complete"
    );
    println!("{}", summary.report_path.display());
    Ok(())
}

async fn cmd_preview(config: AnalyzerConfig, sources: &[String]) -> Result<()> {
    let source = Source::from_inputs(sources).context("Invalid --source")?;
    let ctx = RunContext::new(config);
    let preview = preview_date_range(&ctx, &source)
        .await
        .with_context(|| format!("Date preview failed for {}", source.describe()))?;
    println!(
        "{}",
        serde_json::to_string_pretty(&preview).context("Failed to serialize preview")?
    );
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json_logs);

    let config = load_config(args.config.as_ref())?;

    let outcome = match args.command {
        Command::Run {
            sources,
            output_dir,
            start,
            end,
            reference,
        } => {
            cmd_run(
                config,
                &sources,
                output_dir,
                start.as_deref(),
                end.as_deref(),
                reference,
            )
            .await
        }
        Command::PreviewDates { sources } => cmd_preview(config, &sources).await,
        Command::ShowConfig => {
            print!("{}", config.to_toml().context("Failed to render config")?);
            Ok(())
        }
    };

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}
