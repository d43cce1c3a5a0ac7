//! Fiscal-quarter window resolution
//!
//! Maps a quarter label (or "most recently completed quarter") to the
//! four dates the rest of the pipeline works with. The fiscal year
//! boundary does not align with the calendar year: with the default
//! start month of September, Q1 runs Sep-Nov and the fiscal-year label
//! is the calendar year the fiscal year ends in (start-year + 1).
//!
//! Reports only cover fully elapsed quarters; resolving a window whose
//! end has not passed yet fails before any source is contacted.

use crate::error::ReportError;
use chrono::{Datelike, Duration, NaiveDate};

/// Fiscal calendar with a configurable year start month.
#[derive(Debug, Clone, Copy)]
pub struct FiscalCalendar {
    start_month: u32,
}

/// The resolved reporting window: a current quarter and the quarter
/// immediately preceding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindow {
    pub current_start: NaiveDate,
    pub current_end: NaiveDate,
    pub previous_start: NaiveDate,
    pub previous_end: NaiveDate,
    pub quarter: u8,
    pub fiscal_year: i32,
}

impl FiscalCalendar {
    pub fn new(start_month: u32) -> Self {
        debug_assert!((1..=12).contains(&start_month));
        Self { start_month }
    }

    /// Resolve the reporting window. `label` is `Q<1-4>/<fiscal-year>`;
    /// `None` means the most recently completed quarter relative to
    /// `today`.
    pub fn resolve(&self, today: NaiveDate, label: Option<&str>) -> Result<PeriodWindow, ReportError> {
        let current_start = match label {
            Some(label) => {
                let (quarter, year) = parse_quarter_label(label)?;
                self.quarter_start(year, quarter)
            }
            None => {
                let (fy, quarter) = self.quarter_containing(today);
                let this_start = self.quarter_start(fy, quarter);
                self.previous_quarter_start(this_start)
            }
        };

        let current_end = self.quarter_end(current_start);
        let previous_start = self.previous_quarter_start(current_start);
        let previous_end = current_start - Duration::days(1);

        if current_end >= today {
            return Err(ReportError::PeriodNotElapsed { end: current_end });
        }

        let (fiscal_year, quarter) = self.quarter_containing(current_start);

        Ok(PeriodWindow {
            current_start,
            current_end,
            previous_start,
            previous_end,
            quarter,
            fiscal_year,
        })
    }

    /// First day of the given quarter of the fiscal year ending in
    /// `fy_end_year`.
    fn quarter_start(&self, fy_end_year: i32, quarter: u8) -> NaiveDate {
        let m0 = (self.start_month as i32 - 1) + 3 * (quarter as i32 - 1);
        let year = (fy_end_year - 1) + m0 / 12;
        let month = (m0 % 12 + 1) as u32;
        // month is always in 1..=12 here
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
    }

    fn previous_quarter_start(&self, start: NaiveDate) -> NaiveDate {
        let m0 = (start.year() * 12 + start.month0() as i32) - 3;
        NaiveDate::from_ymd_opt(m0.div_euclid(12), (m0.rem_euclid(12) + 1) as u32, 1)
            .unwrap_or(NaiveDate::MIN)
    }

    fn quarter_end(&self, start: NaiveDate) -> NaiveDate {
        let m0 = (start.year() * 12 + start.month0() as i32) + 3;
        let next = NaiveDate::from_ymd_opt(m0.div_euclid(12), (m0.rem_euclid(12) + 1) as u32, 1)
            .unwrap_or(NaiveDate::MAX);
        next - Duration::days(1)
    }

    /// Fiscal year (end-year convention) and quarter containing `date`.
    fn quarter_containing(&self, date: NaiveDate) -> (i32, u8) {
        let offset = (date.month() as i32 - self.start_month as i32).rem_euclid(12);
        let quarter = (offset / 3 + 1) as u8;
        let fy_start_year = if date.month() as i32 >= self.start_month as i32 {
            date.year()
        } else {
            date.year() - 1
        };
        (fy_start_year + 1, quarter)
    }
}

fn parse_quarter_label(label: &str) -> Result<(u8, i32), ReportError> {
    let invalid = || ReportError::InvalidPeriod(label.to_string());
    let rest = label.strip_prefix('Q').ok_or_else(invalid)?;
    let (qtr, year) = rest.split_once('/').ok_or_else(invalid)?;
    let quarter: u8 = qtr.parse().map_err(|_| invalid())?;
    if !(1..=4).contains(&quarter) {
        return Err(invalid());
    }
    if year.len() != 4 {
        return Err(invalid());
    }
    let year: i32 = year.parse().map_err(|_| invalid())?;
    Ok((quarter, year))
}

impl PeriodWindow {
    pub fn quarter_label(&self) -> String {
        format!("Q{}", self.quarter)
    }

    pub fn year_label(&self) -> String {
        format!("FY{}", self.fiscal_year)
    }

    pub fn period_label(&self) -> String {
        format!("Q{}/{}", self.quarter, self.fiscal_year)
    }

    /// Base name shared by the report artifacts, e.g.
    /// `analytics_report_Q4_2016`.
    pub fn artifact_stem(&self, prefix: &str) -> String {
        format!("{}_Q{}_{}", prefix, self.quarter, self.fiscal_year)
    }

    pub fn describe(&self) -> String {
        format!("{} to {}", self.current_start, self.current_end)
    }
}
