//! Error taxonomy for report runs
//!
//! Fatal errors (invalid period, auth failure, pre-existing output files)
//! abort the run before any artifact is finalized. Recoverable errors
//! (per-entity fetch exhaustion, malformed report lines) are handled
//! locally and surfaced in the run summary.

use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid fiscal quarter '{0}': must be specified in the form Q[1234]/YYYY, e.g. Q4/2016")]
    InvalidPeriod(String),

    #[error("fiscal quarter ending {end} has not fully elapsed")]
    PeriodNotElapsed { end: NaiveDate },

    #[error("authentication with source '{service}' failed: {reason}")]
    SourceAuthentication { service: String, reason: String },

    #[error("fetch for entity '{entity}' failed after {attempts} attempts")]
    EntityFetch { entity: String, attempts: usize },

    #[error("output files already exist: {}", format_paths(.0))]
    ReportFileExists(Vec<PathBuf>),

    #[error("malformed report line {line_no}: {reason}")]
    MalformedReportLine { line_no: usize, reason: String },
}

impl ReportError {
    /// Fatal errors abort the run; the rest are recovered locally and
    /// reported in the run summary.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ReportError::EntityFetch { .. } | ReportError::MalformedReportLine { .. }
        )
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
