//! Flat-file storage report ingestion
//!
//! Archived storage reports are newline-delimited records of the form
//! `<path>:Arbitrary-Oxum: <size_bytes>.<file_count>`, one per bag,
//! where the first two path segments identify provider and collection.
//! Each parse accumulates a synthetic `all`/`all` aggregate across
//! every line; lines carrying the datestamp marker are skipped.
//!
//! Malformed lines are skipped with a warning and carried in the parse
//! result so the run summary can surface them. Minor format drift in
//! the upstream data must not abort a report run.

use crate::error::ReportError;
use crate::models::{EntityKey, MetricVector};
use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Metric order for storage vectors: `[file_count, size_bytes]`.
pub const STORAGE_ARITY: usize = 2;
pub const FILES_METRIC: usize = 0;
pub const SIZE_METRIC: usize = 1;

const OXUM_SEPARATOR: &str = ":Arbitrary-Oxum: ";
const DATESTAMP_MARKER: &str = "DATESTAMP";

/// Decimal gigabyte, the unit the storage report renders sizes in.
pub const GIGABYTE: f64 = 1_000_000_000.0;

#[derive(Debug, Default)]
pub struct ParsedStorageReport {
    pub totals: BTreeMap<EntityKey, MetricVector>,
    /// Skipped-line diagnostics, aggregated into the run summary.
    pub malformed: Vec<ReportError>,
}

/// Parse one storage report file.
pub fn parse_report_file(path: &Path) -> Result<ParsedStorageReport> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open storage report {}", path.display()))?;
    let report = parse_report(BufReader::new(file))?;
    debug!(
        report = %path.display(),
        entities = report.totals.len(),
        skipped = report.malformed.len(),
        "Parsed storage report"
    );
    Ok(report)
}

pub fn parse_report<R: BufRead>(reader: R) -> Result<ParsedStorageReport> {
    let mut report = ParsedStorageReport::default();
    report
        .totals
        .insert(EntityKey::aggregate(), MetricVector::zero(STORAGE_ARITY));

    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read storage report line")?;
        let line_no = idx + 1;
        if line.trim().is_empty() || line.contains(DATESTAMP_MARKER) {
            continue;
        }
        match parse_line(&line) {
            Ok((key, vector)) => {
                report
                    .totals
                    .entry(key)
                    .or_insert_with(|| MetricVector::zero(STORAGE_ARITY))
                    .add_assign(&vector);
                if let Some(all) = report.totals.get_mut(&EntityKey::aggregate()) {
                    all.add_assign(&vector);
                }
            }
            Err(reason) => {
                warn!(line_no, %reason, "Skipping malformed storage report line");
                report
                    .malformed
                    .push(ReportError::MalformedReportLine { line_no, reason });
            }
        }
    }

    Ok(report)
}

fn parse_line(line: &str) -> std::result::Result<(EntityKey, MetricVector), String> {
    let (path, oxum) = line
        .split_once(OXUM_SEPARATOR)
        .ok_or_else(|| "missing Arbitrary-Oxum separator".to_string())?;

    // "/provider/collection/..." - segments after the leading separator
    let segments: Vec<&str> = path.split('/').collect();
    let (provider, collection) = match (segments.get(1), segments.get(2)) {
        (Some(p), Some(c)) if !p.is_empty() && !c.is_empty() => (*p, *c),
        _ => return Err(format!("path '{path}' lacks provider/collection segments")),
    };

    let (size, num_files) = oxum
        .trim()
        .split_once('.')
        .ok_or_else(|| format!("oxum '{}' is not <size>.<count>", oxum.trim()))?;
    let size: u64 = size
        .parse()
        .map_err(|_| format!("oxum size '{size}' is not numeric"))?;
    let num_files: u64 = num_files
        .parse()
        .map_err(|_| format!("oxum file count '{num_files}' is not numeric"))?;

    Ok((
        EntityKey::new(provider, collection),
        MetricVector::from(vec![num_files, size]),
    ))
}

/// The datestamp the archived report for a quarter is published under:
/// the last Sunday strictly before the next quarter begins.
pub fn report_date(quarter_end: NaiveDate) -> NaiveDate {
    let mut date = quarter_end;
    while date.weekday() != Weekday::Sun {
        date -= Duration::days(1);
    }
    date
}

/// Locate the archived report file for the quarter ending at
/// `quarter_end`: the first `<YYYYMMDD>*.txt` match for the expected
/// report datestamp.
pub fn find_report_file(data_dir: &Path, quarter_end: NaiveDate) -> Result<PathBuf> {
    let stamp = report_date(quarter_end).format("%Y%m%d").to_string();
    let pattern = data_dir.join(format!("{stamp}*.txt"));
    let pattern_str = pattern.to_string_lossy().to_string();

    let mut matches: Vec<PathBuf> = glob::glob(&pattern_str)
        .with_context(|| format!("Invalid report glob pattern {pattern_str}"))?
        .filter_map(|entry| entry.ok())
        .collect();
    matches.sort();

    matches
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No storage report matching {pattern_str}"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub gigabytes: f64,
}

/// Quarter-over-quarter size series for one entity, read from every
/// archived report in `data_dir` whose name leads with a datestamp.
pub fn trend_series(data_dir: &Path, key: &EntityKey) -> Result<Vec<TrendPoint>> {
    let pattern = data_dir.join("*.txt").to_string_lossy().to_string();
    let mut points = Vec::new();

    for entry in glob::glob(&pattern)
        .with_context(|| format!("Invalid report glob pattern {pattern}"))?
        .filter_map(|entry| entry.ok())
    {
        let Some(date) = datestamp_of(&entry) else {
            debug!(file = %entry.display(), "Skipping report without leading datestamp");
            continue;
        };
        let report = parse_report_file(&entry)?;
        if let Some(vector) = report.totals.get(key) {
            points.push(TrendPoint {
                date,
                gigabytes: vector.get(SIZE_METRIC) as f64 / GIGABYTE,
            });
        }
    }

    points.sort_by_key(|p| p.date);
    Ok(points)
}

fn datestamp_of(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let stamp = name.get(0..8)?;
    NaiveDate::parse_from_str(stamp, "%Y%m%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\
/cornell/aco/bag001:Arbitrary-Oxum: 1000.10
/cornell/aco/bag002:Arbitrary-Oxum: 500.5
/princeton/geo/bag001:Arbitrary-Oxum: 2000.1
DATESTAMP: 20160904T030003
";

    #[test]
    fn test_parse_accumulates_per_collection_and_all() {
        let report = parse_report(Cursor::new(SAMPLE)).unwrap();
        assert!(report.malformed.is_empty());

        let aco = &report.totals[&EntityKey::new("cornell", "aco")];
        assert_eq!(aco.get(FILES_METRIC), 15);
        assert_eq!(aco.get(SIZE_METRIC), 1500);

        let geo = &report.totals[&EntityKey::new("princeton", "geo")];
        assert_eq!(geo.get(FILES_METRIC), 1);
        assert_eq!(geo.get(SIZE_METRIC), 2000);

        let all = &report.totals[&EntityKey::aggregate()];
        assert_eq!(all.get(FILES_METRIC), 16);
        assert_eq!(all.get(SIZE_METRIC), 3500);
    }

    #[test]
    fn test_malformed_lines_are_skipped_not_fatal() {
        let input = "\
garbage line
/cornell/aco/bag001:Arbitrary-Oxum: 1000.10
/short:Arbitrary-Oxum: 5.1
/cornell/aco/bag002:Arbitrary-Oxum: notanumber.2
";
        let report = parse_report(Cursor::new(input)).unwrap();
        assert_eq!(report.malformed.len(), 3);
        // the good line still lands
        let aco = &report.totals[&EntityKey::new("cornell", "aco")];
        assert_eq!(aco.get(SIZE_METRIC), 1000);
        // the aggregate only counts parsed lines
        let all = &report.totals[&EntityKey::aggregate()];
        assert_eq!(all.get(SIZE_METRIC), 1000);
    }

    #[test]
    fn test_report_date_is_sunday_on_or_before_quarter_end() {
        // 2016-08-31 is a Wednesday; the preceding Sunday is 08-28
        let end = NaiveDate::from_ymd_opt(2016, 8, 31).unwrap();
        assert_eq!(report_date(end), NaiveDate::from_ymd_opt(2016, 8, 28).unwrap());

        // a quarter ending on a Sunday reports on that Sunday
        let end = NaiveDate::from_ymd_opt(2017, 12, 31).unwrap();
        assert_eq!(report_date(end), end);
    }

    #[test]
    fn test_find_report_file_by_datestamp() {
        let dir = tempfile::tempdir().unwrap();
        let end = NaiveDate::from_ymd_opt(2016, 8, 31).unwrap();
        let hit = dir.path().join("20160828T030003-storage-report.txt");
        std::fs::write(&hit, SAMPLE).unwrap();
        std::fs::write(dir.path().join("20160501T030003-storage-report.txt"), SAMPLE).unwrap();

        assert_eq!(find_report_file(dir.path(), end).unwrap(), hit);
    }

    #[test]
    fn test_find_report_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let end = NaiveDate::from_ymd_opt(2016, 8, 31).unwrap();
        assert!(find_report_file(dir.path(), end).is_err());
    }

    #[test]
    fn test_trend_series_orders_by_date() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("20160828T030003-storage-report.txt"),
            "/cornell/aco/b:Arbitrary-Oxum: 2000000000.2\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("20160529T030003-storage-report.txt"),
            "/cornell/aco/b:Arbitrary-Oxum: 1000000000.1\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a report\n").unwrap();

        let series = trend_series(dir.path(), &EntityKey::new("cornell", "aco")).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, NaiveDate::from_ymd_opt(2016, 5, 29).unwrap());
        assert!((series[0].gigabytes - 1.0).abs() < 1e-9);
        assert!((series[1].gigabytes - 2.0).abs() < 1e-9);
    }
}
