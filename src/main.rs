use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use quarterly_report::config::Config;
use quarterly_report::display::DisplayManager;
use quarterly_report::engine::{ReportEngine, ReportSpec};
use quarterly_report::logging;
use quarterly_report::models::EntityKey;
use quarterly_report::period::FiscalCalendar;
use quarterly_report::storage;

#[derive(Parser)]
#[command(name = "quarterly-report")]
#[command(about = "Fiscal-quarter comparative reporting across analytics and storage backends")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the analytics report (sessions, users, pageviews)
    Analytics {
        /// Fiscal quarter, e.g. Q4/2016 (default: last completed)
        #[arg(short, long)]
        fiscal_qtr: Option<String>,
        /// Output directory for the report artifacts
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Generate the storage report (file counts, sizes)
    Storage {
        /// Fiscal quarter, e.g. Q4/2016 (default: last completed)
        #[arg(short, long)]
        fiscal_qtr: Option<String>,
        /// Output directory for the report artifacts
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Print the quarter-over-quarter size series for one collection
    Trend {
        /// Provider the collection belongs to
        #[arg(long)]
        provider: String,
        /// Collection name
        #[arg(long)]
        collection: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();

    let cli = Cli::parse();
    let display = DisplayManager::new();

    match cli.command.unwrap_or(Commands::Analytics {
        fiscal_qtr: None,
        output_dir: None,
    }) {
        Commands::Analytics {
            fiscal_qtr,
            output_dir,
        } => {
            run_report(
                ReportSpec::analytics(),
                fiscal_qtr.as_deref(),
                output_dir,
                &display,
            )
            .await
        }
        Commands::Storage {
            fiscal_qtr,
            output_dir,
        } => {
            run_report(
                ReportSpec::storage(),
                fiscal_qtr.as_deref(),
                output_dir,
                &display,
            )
            .await
        }
        Commands::Trend {
            provider,
            collection,
        } => {
            let config = Config::load()?;
            let key = EntityKey::new(provider, collection);
            match storage::trend_series(&config.storage.report_dir, &key) {
                Ok(points) => {
                    display.display_trend(&key.to_string(), &points);
                    Ok(())
                }
                Err(e) => handle_error(e),
            }
        }
    }
}

async fn run_report(
    spec: ReportSpec,
    fiscal_qtr: Option<&str>,
    output_dir: Option<PathBuf>,
    display: &DisplayManager,
) -> Result<()> {
    let (config, window) = match prepare(fiscal_qtr, output_dir) {
        Ok(prepared) => prepared,
        Err(e) => return handle_error(e),
    };
    let engine = ReportEngine::new(&config, window);
    match engine.run(&spec).await {
        Ok(outcome) => {
            display.display_outcome(&outcome);
            Ok(())
        }
        Err(e) => handle_error(e),
    }
}

/// Load configuration, apply CLI overrides, and resolve the reporting
/// window. Period errors surface here, before any source is touched.
fn prepare(
    fiscal_qtr: Option<&str>,
    output_dir: Option<PathBuf>,
) -> Result<(Config, quarterly_report::period::PeriodWindow)> {
    let mut config = Config::load()?;
    if let Some(dir) = output_dir {
        config.paths.output_dir = dir;
    }

    let calendar = FiscalCalendar::new(config.report.fiscal_start_month);
    let window = calendar.resolve(chrono::Local::now().date_naive(), fiscal_qtr)?;
    Ok((config, window))
}

fn handle_error(e: anyhow::Error) -> Result<()> {
    eprintln!("Error: {e}");
    process::exit(1);
}
