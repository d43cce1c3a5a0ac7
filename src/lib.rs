//! Quarterly Report Library
//!
//! Comparative fiscal-quarter reporting across heterogeneous metric
//! backends: analytics APIs (two generations, reconciled by normalized
//! entity name) and flat-file archival storage reports. Each run
//! computes period-over-period deltas for the most recently completed
//! fiscal quarter and emits a dual-format artifact pair (delimited
//! table + styled spreadsheet) archived to an output directory.
//!
//! ## Pipeline
//!
//! 1. [`period`] resolves the fiscal-quarter window (explicit label or
//!    most recently completed)
//! 2. [`sources`] / [`storage`] produce per-source, per-period metric
//!    vectors keyed by normalized entity
//! 3. [`reconcile`] merges the per-source results into one ordered key
//!    space, flagging entities present in only one backend
//! 4. [`delta`] computes fractional period-over-period changes with an
//!    explicit zero-baseline sentinel
//! 5. [`rows`] assembles typed cells into the final row sequence
//! 6. [`writer`] emits both artifacts, keeping rendered magnitudes
//!    identical between them
//! 7. [`delivery`] archives the finalized files and hands the manifest
//!    to the external mail side
//!
//! ## Main Entry Point
//!
//! The pipeline is driven through [`ReportEngine`], parameterized by a
//! [`ReportSpec`] per report variant:
//!
//! ```rust,no_run
//! use quarterly_report::{Config, FiscalCalendar, ReportEngine, ReportSpec};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let window = FiscalCalendar::new(config.report.fiscal_start_month)
//!     .resolve(chrono::Local::now().date_naive(), None)?;
//! let engine = ReportEngine::new(&config, window);
//! let sources = engine.build_sources()?;
//! let outcome = engine.run_analytics(&ReportSpec::analytics(), sources).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod delivery;
pub mod delta;
pub mod display;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod period;
pub mod reconcile;
pub mod rows;
pub mod sources;
pub mod storage;
pub mod writer;

pub use config::Config;
pub use engine::{ReportEngine, ReportKind, ReportOutcome, ReportSpec, RunSummary};
pub use error::ReportError;
pub use models::{EntityKey, FetchOutcome, MetricVector, ReconciledRecord, SourceTag};
pub use period::{FiscalCalendar, PeriodWindow};
pub use writer::ReportWriter;
