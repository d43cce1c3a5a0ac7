use chrono::NaiveDate;
use quarterly_report::config::Config;
use quarterly_report::engine::{ReportEngine, ReportSpec};
use quarterly_report::error::ReportError;
use quarterly_report::models::SourceTag;
use quarterly_report::period::{FiscalCalendar, PeriodWindow};
use quarterly_report::sources::{SourceClient, StaticSource};
use std::path::Path;
use tempfile::TempDir;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn window() -> PeriodWindow {
    FiscalCalendar::new(9)
        .resolve(d(2016, 10, 15), Some("Q4/2016"))
        .unwrap()
}

fn test_config(output_dir: &Path) -> Config {
    let mut config = Config::default();
    config.paths.output_dir = output_dir.to_path_buf();
    config
}

fn read_csv(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(|f| f.to_string()).collect())
        .collect()
}

/// One source reporting Acme for both windows.
fn acme_source() -> SourceClient {
    let w = window();
    let mut source = StaticSource::new(SourceTag::new("property"));
    source.push_entity_with_link("Library:Acme - GA4", "p1", "https://analytics.example.edu/p1");
    source.insert_metrics("p1", w.current_start, w.current_end, vec![100, 50, 200]);
    source.insert_metrics("p1", w.previous_start, w.previous_end, vec![80, 40, 150]);
    SourceClient::Static(source)
}

#[tokio::test]
async fn test_analytics_end_to_end() {
    let output = TempDir::new().unwrap();
    let config = test_config(output.path());
    let engine = ReportEngine::new(&config, window());

    let outcome = engine
        .run_analytics(&ReportSpec::analytics(), vec![acme_source()])
        .await
        .unwrap();

    assert_eq!(outcome.files.len(), 2);
    assert!(outcome.summary.is_clean());

    let csv_rows = read_csv(&outcome.files[0]);
    // title, year, quarter, header, one entity, totals
    assert_eq!(csv_rows.len(), 6);
    assert_eq!(csv_rows[1], vec!["Year:", "FY2016"]);
    assert_eq!(csv_rows[2], vec!["Quarter:", "Q4"]);
    // the GA4 suffix is normalized away; deltas are per column
    assert_eq!(
        csv_rows[4],
        vec!["Library", "Acme", "100", "25.00%", "50", "25.00%", "200", "33.33%"]
    );

    // artifacts land in the output directory under the quarter stem
    assert!(output.path().join("analytics_report_Q4_2016.csv").exists());
    assert!(output.path().join("analytics_report_Q4_2016.xlsx").exists());
}

#[tokio::test]
async fn test_entity_only_in_previous_period_is_minus_100() {
    let output = TempDir::new().unwrap();
    let config = test_config(output.path());
    let w = window();

    let mut source = StaticSource::new(SourceTag::new("property"));
    source.push_entity("Library:Gone", "p9");
    // no current-window metrics: the fetch returns Empty
    source.insert_metrics("p9", w.previous_start, w.previous_end, vec![40, 20, 10]);

    let engine = ReportEngine::new(&config, w);
    let outcome = engine
        .run_analytics(&ReportSpec::analytics(), vec![SourceClient::Static(source)])
        .await
        .unwrap();

    let csv_rows = read_csv(&outcome.files[0]);
    assert_eq!(
        csv_rows[4],
        vec!["Library", "Gone", "0", "-100.00%", "0", "-100.00%", "0", "-100.00%"]
    );
}

#[tokio::test]
async fn test_two_sources_merge_and_single_source_audit() {
    let output = TempDir::new().unwrap();
    let config = test_config(output.path());
    let w = window();

    let mut legacy = StaticSource::new(SourceTag::new("legacy"));
    legacy.push_entity("Library:Shared", "v3-1");
    legacy.insert_metrics("v3-1", w.current_start, w.current_end, vec![10, 5, 20]);
    legacy.insert_metrics("v3-1", w.previous_start, w.previous_end, vec![10, 5, 20]);

    let mut property = StaticSource::new(SourceTag::new("property"));
    property.push_entity("Library:Shared - GA4", "v4-1");
    property.push_entity("Library:OnlyNew - GA4", "v4-2");
    property.insert_metrics("v4-1", w.current_start, w.current_end, vec![5, 3, 8]);
    property.insert_metrics("v4-2", w.current_start, w.current_end, vec![3, 2, 1]);

    let engine = ReportEngine::new(&config, w);
    let outcome = engine
        .run_analytics(
            &ReportSpec::analytics(),
            vec![
                SourceClient::Static(legacy),
                SourceClient::Static(property),
            ],
        )
        .await
        .unwrap();

    // both generations summed for the shared entity
    let csv_rows = read_csv(&outcome.files[0]);
    let shared = csv_rows
        .iter()
        .find(|row| row.get(1).map(String::as_str) == Some("Shared"))
        .unwrap();
    assert_eq!(shared[2], "15");

    // the audit flags the property-only entity without affecting totals
    assert_eq!(outcome.summary.single_source.len(), 1);
    let (key, tag) = &outcome.summary.single_source[0];
    assert_eq!(key.name, "OnlyNew");
    assert_eq!(tag, &SourceTag::new("property"));

    let totals = csv_rows.last().unwrap();
    assert_eq!(totals[0], "All");
    assert_eq!(totals[2], "18");
}

#[tokio::test]
async fn test_totals_row_uses_summed_baseline() {
    let output = TempDir::new().unwrap();
    let config = test_config(output.path());
    let w = window();

    // per-entity changes +100%, +100%, -50% average to +50%; the
    // summed totals (220 -> 140) are what the totals row must show
    let mut source = StaticSource::new(SourceTag::new("property"));
    for (name, id, prev, cur) in [
        ("Library:A", "p1", 10u64, 20u64),
        ("Library:B", "p2", 10, 20),
        ("Library:C", "p3", 200, 100),
    ] {
        source.push_entity(name, id);
        source.insert_metrics(id, w.current_start, w.current_end, vec![cur, 0, 0]);
        source.insert_metrics(id, w.previous_start, w.previous_end, vec![prev, 0, 0]);
    }

    let engine = ReportEngine::new(&config, w);
    let outcome = engine
        .run_analytics(&ReportSpec::analytics(), vec![SourceClient::Static(source)])
        .await
        .unwrap();

    let csv_rows = read_csv(&outcome.files[0]);
    let totals = csv_rows.last().unwrap();
    assert_eq!(totals[2], "140");
    assert_eq!(totals[3], "-36.36%");
}

#[tokio::test]
async fn test_preflight_rejects_existing_output() {
    let output = TempDir::new().unwrap();
    let config = test_config(output.path());
    std::fs::write(output.path().join("analytics_report_Q4_2016.csv"), "old").unwrap();

    let engine = ReportEngine::new(&config, window());
    let err = engine
        .run_analytics(&ReportSpec::analytics(), vec![acme_source()])
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ReportError>(),
        Some(ReportError::ReportFileExists(_))
    ));
    // the stale artifact is untouched
    assert_eq!(
        std::fs::read_to_string(output.path().join("analytics_report_Q4_2016.csv")).unwrap(),
        "old"
    );
}

#[tokio::test]
async fn test_skip_list_excludes_entity() {
    let output = TempDir::new().unwrap();
    let mut config = test_config(output.path());
    config.report.skip_list = vec!["Library:Acme".to_string()];

    let engine = ReportEngine::new(&config, window());
    let outcome = engine
        .run_analytics(&ReportSpec::analytics(), vec![acme_source()])
        .await
        .unwrap();

    let csv_rows = read_csv(&outcome.files[0]);
    // preamble + header + totals only
    assert_eq!(csv_rows.len(), 5);
    assert_eq!(outcome.summary.skipped_entities, vec!["Library:Acme".to_string()]);
}

#[tokio::test]
async fn test_storage_end_to_end() {
    let output = TempDir::new().unwrap();
    let reports = TempDir::new().unwrap();
    let mut config = test_config(output.path());
    config.storage.report_dir = reports.path().to_path_buf();
    config.report.no_baseline = "na".to_string();

    // Q4/2016 ends 2016-08-31 (reports on Sunday 08-28); the previous
    // quarter ends 2016-05-31 (reports on Sunday 05-29)
    std::fs::write(
        reports.path().join("20160828T030003-storage-report.txt"),
        "/cornell/aco/bag1:Arbitrary-Oxum: 2000000000.20\n\
         /princeton/geo/bag1:Arbitrary-Oxum: 1000000000.10\n\
         not a parseable line\n",
    )
    .unwrap();
    std::fs::write(
        reports.path().join("20160529T030003-storage-report.txt"),
        "/cornell/aco/bag1:Arbitrary-Oxum: 1000000000.10\n",
    )
    .unwrap();

    let engine = ReportEngine::new(&config, window());
    let outcome = engine.run_storage(&ReportSpec::storage()).await.unwrap();

    assert_eq!(outcome.summary.malformed_lines, 1);
    assert!(!outcome.summary.aggregate_mismatch);

    let csv_rows = read_csv(&outcome.files[0]);
    assert_eq!(csv_rows[0], vec!["Collections quarterly report - storage"]);

    // sorted by size descending: cornell (2 GB) before princeton (1 GB)
    assert_eq!(
        csv_rows[4],
        vec!["cornell", "aco", "", "20", "100.00%", "2.00 GB", "100.00%"]
    );
    // princeton has no previous-quarter entry: zero baseline, rendered
    // under the configured N/A policy
    assert_eq!(
        csv_rows[5],
        vec!["princeton", "geo", "", "10", "N/A", "1.00 GB", "N/A"]
    );

    let totals = csv_rows.last().unwrap();
    assert_eq!(totals[0], "All");
    assert_eq!(totals[3], "30");
    assert_eq!(totals[5], "3.00 GB");
    assert_eq!(totals[6], "200.00%");
}

#[tokio::test]
async fn test_storage_missing_report_file_is_fatal() {
    let output = TempDir::new().unwrap();
    let reports = TempDir::new().unwrap();
    let mut config = test_config(output.path());
    config.storage.report_dir = reports.path().to_path_buf();

    let engine = ReportEngine::new(&config, window());
    let err = engine.run_storage(&ReportSpec::storage()).await.unwrap_err();
    assert!(err.to_string().contains("No storage report matching"));

    // no partial artifact was delivered
    assert!(!output.path().join("storage_report_Q4_2016.csv").exists());
}
