//! Report pipeline engine
//!
//! One pipeline serves every report variant, parameterized by an
//! explicit [`ReportSpec`] instead of near-duplicate scripts branching
//! on ambient flags. The engine resolves nothing itself: it is handed a
//! resolved [`PeriodWindow`] and configuration, runs the pre-flight
//! guards, gathers and reconciles source data, and drives the row
//! builder and writer.
//!
//! Failure policy: a fetch failure for one entity is retried, then
//! zero-substituted and noted in the run summary; an authentication
//! failure or pre-existing output file aborts the run before any
//! artifact is finalized.

use crate::config::Config;
use crate::delivery::{self, DeliveryManifest, Staging};
use crate::error::ReportError;
use crate::logging;
use crate::models::{
    EntityKey, MetricColumn, MetricKind, MetricSchema, MetricVector, SourceTag,
};
use crate::normalize::NameNormalizer;
use crate::period::PeriodWindow;
use crate::reconcile::{self, Reconciliation, SourceResult};
use crate::rows::{Cell, NoBaselineStyle, ReportRow, ReportRowBuilder};
use crate::sources::{RetryPolicy, SourceClient, SourceError, StaticSource};
use crate::storage;
use crate::writer::ReportWriter;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Analytics,
    Storage,
}

/// Parameterization of one report variant: which pipeline branch to
/// run, the artifact naming, and the table shape.
#[derive(Debug, Clone)]
pub struct ReportSpec {
    pub kind: ReportKind,
    pub file_prefix: &'static str,
    pub report_name: &'static str,
    pub title: &'static str,
    pub lead_headers: Vec<&'static str>,
    pub schema: MetricSchema,
    /// Metric column the entity rows are sorted by, descending.
    pub sort_column: usize,
}

impl ReportSpec {
    pub fn analytics() -> Self {
        Self {
            kind: ReportKind::Analytics,
            file_prefix: "analytics_report",
            report_name: "Analytics",
            title: "Collections quarterly report - analytics",
            lead_headers: vec!["Account", "Property"],
            schema: MetricSchema::new(vec![
                MetricColumn {
                    name: "# of sessions",
                    kind: MetricKind::Count,
                },
                MetricColumn {
                    name: "# of users",
                    kind: MetricKind::Count,
                },
                MetricColumn {
                    name: "# of pageviews",
                    kind: MetricKind::Count,
                },
            ]),
            sort_column: 0,
        }
    }

    pub fn storage() -> Self {
        Self {
            kind: ReportKind::Storage,
            file_prefix: "storage_report",
            report_name: "Storage",
            title: "Collections quarterly report - storage",
            lead_headers: vec!["Partner", "Collection", "Title"],
            schema: MetricSchema::new(vec![
                MetricColumn {
                    name: "Files",
                    kind: MetricKind::Count,
                },
                MetricColumn {
                    name: "Size in GB",
                    kind: MetricKind::Bytes,
                },
            ]),
            sort_column: storage::SIZE_METRIC,
        }
    }
}

/// Non-fatal findings surfaced alongside the report.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub run_id: String,
    /// Entities whose fetch was abandoned and zero-substituted.
    pub partial_entities: Vec<String>,
    /// Entities present in exactly one source (audit listing).
    pub single_source: Vec<(EntityKey, SourceTag)>,
    /// Configured entities excluded from this run.
    pub skipped_entities: Vec<String>,
    /// Malformed storage report lines skipped during parsing.
    pub malformed_lines: usize,
    /// Summed per-entity totals disagreed with the source aggregate.
    pub aggregate_mismatch: bool,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            run_id: logging::run_id().to_string(),
            ..Self::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.partial_entities.is_empty() && self.malformed_lines == 0 && !self.aggregate_mismatch
    }
}

/// A finished run: archived artifact paths, the rows both artifacts
/// were generated from, and the run summary.
#[derive(Debug)]
pub struct ReportOutcome {
    pub files: Vec<PathBuf>,
    pub rows: Vec<ReportRow>,
    pub policy: NoBaselineStyle,
    pub summary: RunSummary,
}

pub struct ReportEngine<'a> {
    config: &'a Config,
    window: PeriodWindow,
}

impl<'a> ReportEngine<'a> {
    pub fn new(config: &'a Config, window: PeriodWindow) -> Self {
        Self { config, window }
    }

    fn policy(&self) -> NoBaselineStyle {
        NoBaselineStyle::from_config(&self.config.report.no_baseline)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.config.sources.max_retries,
            timeout: Duration::from_secs(self.config.sources.timeout_secs),
        }
    }

    /// Refuse to regenerate a report that already exists for the
    /// resolved quarter. Runs before any source I/O.
    pub fn preflight(&self, spec: &ReportSpec) -> std::result::Result<(), ReportError> {
        let stem = self.window.artifact_stem(spec.file_prefix);
        let existing: Vec<PathBuf> = ["csv", "xlsx"]
            .iter()
            .map(|ext| self.config.paths.output_dir.join(format!("{stem}.{ext}")))
            .filter(|path| path.exists())
            .collect();
        if existing.is_empty() {
            Ok(())
        } else {
            Err(ReportError::ReportFileExists(existing))
        }
    }

    /// Build the configured analytics source clients.
    pub fn build_sources(&self) -> Result<Vec<SourceClient>> {
        let mut sources = Vec::new();
        for endpoint in &self.config.sources.analytics {
            let tag = SourceTag::new(endpoint.tag.clone());
            let client = match endpoint.kind.as_str() {
                "snapshot" => SourceClient::Static(StaticSource::from_snapshot_file(
                    tag,
                    std::path::Path::new(&endpoint.location),
                )?),
                #[cfg(feature = "http-source")]
                "http" => SourceClient::Http(crate::sources::HttpSource::new(
                    tag,
                    endpoint.location.clone(),
                    endpoint.token.clone(),
                )),
                #[cfg(not(feature = "http-source"))]
                "http" => anyhow::bail!(
                    "Source '{}' requires the http-source feature",
                    endpoint.tag
                ),
                other => anyhow::bail!("Unknown source kind '{other}'"),
            };
            sources.push(client);
        }
        Ok(sources)
    }

    /// Run the report variant the spec names, building sources from
    /// configuration where the variant needs them. The pre-flight
    /// guard runs before any source is even constructed.
    pub async fn run(&self, spec: &ReportSpec) -> Result<ReportOutcome> {
        self.preflight(spec)?;
        match spec.kind {
            ReportKind::Analytics => {
                let sources = self.build_sources()?;
                self.run_analytics(spec, sources).await
            }
            ReportKind::Storage => self.run_storage(spec).await,
        }
    }

    /// Run the analytics report across the given sources.
    pub async fn run_analytics(
        &self,
        spec: &ReportSpec,
        sources: Vec<SourceClient>,
    ) -> Result<ReportOutcome> {
        self.preflight(spec)?;

        let mut summary = RunSummary::new();
        let normalizer = NameNormalizer::new(self.config.report.strip_patterns.clone());
        let arity = spec.schema.arity();
        let retry = self.retry_policy();

        let mut results = Vec::with_capacity(sources.len());
        let mut links: Vec<(EntityKey, String)> = Vec::new();

        for source in &sources {
            let tag = source.tag().clone();
            let entities = source.list_entities().await.map_err(|e| match e {
                SourceError::Authentication(reason) => anyhow::Error::from(
                    ReportError::SourceAuthentication {
                        service: tag.to_string(),
                        reason,
                    },
                ),
                SourceError::Transient(reason) => {
                    anyhow::anyhow!("Failed to list entities from '{tag}': {reason}")
                }
            })?;
            info!(source = %tag, entities = entities.len(), "Listed source catalog");

            let mut result = SourceResult::new(tag.clone());
            for entry in entities {
                // the same normalizer covers catalog listing and fetch,
                // so both resolve to one key
                let key = entity_key(&normalizer, &entry.display_name);
                let label = key.to_string();

                if self.config.report.skip_list.iter().any(|s| *s == label) {
                    info!(entity = %label, "Skipping configured entity");
                    summary.skipped_entities.push(label);
                    continue;
                }

                // the two period windows are independent reads
                let (current, previous) = futures::join!(
                    source.fetch_with_retry(
                        retry,
                        &entry.entity_id,
                        self.window.current_start,
                        self.window.current_end,
                    ),
                    source.fetch_with_retry(
                        retry,
                        &entry.entity_id,
                        self.window.previous_start,
                        self.window.previous_end,
                    ),
                );

                let mut partial = false;
                let current = self.unwrap_fetch(current, arity, &label, &tag, &mut partial)?;
                let previous = self.unwrap_fetch(previous, arity, &label, &tag, &mut partial)?;

                if partial {
                    result.partial.insert(key.clone());
                    summary.partial_entities.push(format!("{label} ({tag})"));
                }
                if let Some(link) = entry.link.clone() {
                    links.push((key.clone(), link));
                }

                result
                    .current
                    .entry(key.clone())
                    .or_insert_with(|| MetricVector::zero(arity))
                    .add_assign(&current);
                result
                    .previous
                    .entry(key)
                    .or_insert_with(|| MetricVector::zero(arity))
                    .add_assign(&previous);
            }
            results.push(result);
        }

        let mut merged = reconcile::reconcile(&results, arity);
        for (key, link) in links {
            if let Some(record) = merged.records.iter_mut().find(|r| r.key == key) {
                record.link.get_or_insert(link);
            }
        }
        summary.single_source = merged.single_source.clone();

        let rows = self.assemble_rows(spec, &merged, |record| {
            let name_cell = match &record.link {
                Some(url) => Cell::link(url.clone(), record.key.name.clone()),
                None => Cell::label(record.key.name.clone()),
            };
            vec![Cell::label(record.key.group.clone()), name_cell]
        });

        self.finish(spec, rows, summary).await
    }

    /// Run the storage report from the archived flat-file reports.
    pub async fn run_storage(&self, spec: &ReportSpec) -> Result<ReportOutcome> {
        self.preflight(spec)?;

        let mut summary = RunSummary::new();
        let data_dir = &self.config.storage.report_dir;

        let current_file = storage::find_report_file(data_dir, self.window.current_end)?;
        let previous_file = storage::find_report_file(data_dir, self.window.previous_end)?;
        info!(
            current = %current_file.display(),
            previous = %previous_file.display(),
            "Located storage report files"
        );

        let current = storage::parse_report_file(&current_file)?;
        let previous = storage::parse_report_file(&previous_file)?;
        summary.malformed_lines = current.malformed.len() + previous.malformed.len();

        let mut result = SourceResult::new(SourceTag::new("storage"));
        result.current = current.totals;
        result.previous = previous.totals;

        let mut merged = reconcile::reconcile(&[result], spec.schema.arity());
        self.resolve_titles(&mut merged).await;
        self.cross_check_aggregate(&merged, spec.schema.arity(), &mut summary);

        let rows = self.assemble_rows(spec, &merged, |record| {
            vec![
                Cell::label(record.key.group.clone()),
                Cell::label(record.key.name.clone()),
                Cell::label(record.display_title.clone().unwrap_or_default()),
            ]
        });

        self.finish(spec, rows, summary).await
    }

    fn unwrap_fetch(
        &self,
        outcome: std::result::Result<crate::models::FetchOutcome, ReportError>,
        arity: usize,
        entity: &str,
        tag: &SourceTag,
        partial: &mut bool,
    ) -> Result<MetricVector> {
        match outcome {
            Ok(crate::models::FetchOutcome::Present(vector)) => Ok(vector),
            Ok(crate::models::FetchOutcome::Empty) => {
                // absent is not the same as zero, but counts as zero
                debug!(entity, source = %tag, "Source returned no data for window");
                Ok(MetricVector::zero(arity))
            }
            Err(err @ ReportError::SourceAuthentication { .. }) => Err(err.into()),
            Err(err) => {
                warn!(entity, source = %tag, %err, "Substituting zero vector after fetch failure");
                *partial = true;
                Ok(MetricVector::zero(arity))
            }
        }
    }

    async fn resolve_titles(&self, merged: &mut Reconciliation) {
        #[cfg(feature = "http-source")]
        if let Some(title_dir) = &self.config.storage.title_dir {
            let catalog = crate::sources::HttpTitleCatalog::new(title_dir.clone());
            for record in merged.records.iter_mut() {
                record.display_title = catalog
                    .title_for(&record.key.group, &record.key.name)
                    .await;
            }
        }
        #[cfg(not(feature = "http-source"))]
        let _ = merged;
    }

    fn cross_check_aggregate(
        &self,
        merged: &Reconciliation,
        arity: usize,
        summary: &mut RunSummary,
    ) {
        if let Some(aggregate) = &merged.aggregate {
            let (current, previous) = merged.summed_totals(arity);
            if current != aggregate.current || previous != aggregate.previous {
                warn!(
                    summed_current = ?current,
                    aggregate_current = ?aggregate.current,
                    "Summed totals disagree with source aggregate"
                );
                summary.aggregate_mismatch = true;
            }
        }
    }

    fn assemble_rows<F>(
        &self,
        spec: &ReportSpec,
        merged: &Reconciliation,
        lead_cells: F,
    ) -> Vec<ReportRow>
    where
        F: Fn(&crate::models::ReconciledRecord) -> Vec<Cell>,
    {
        let mut builder = ReportRowBuilder::new(
            spec.title,
            &self.window,
            spec.lead_headers.clone(),
            spec.schema.clone(),
            spec.sort_column,
        );
        for record in &merged.records {
            builder.push_entity(
                lead_cells(record),
                record.current.clone(),
                record.previous.clone(),
            );
        }
        builder.build()
    }

    async fn finish(
        &self,
        spec: &ReportSpec,
        rows: Vec<ReportRow>,
        summary: RunSummary,
    ) -> Result<ReportOutcome> {
        let staging = Staging::new()?;
        let stem = self.window.artifact_stem(spec.file_prefix);
        let mut writer = ReportWriter::new(
            staging.dir(),
            &stem,
            self.policy(),
            self.config.report.header_offset,
        )?;

        let header_row = self.config.report.header_offset;
        for (i, row) in rows.iter().enumerate() {
            if i == header_row {
                writer.add_header_row(row)?;
            } else {
                writer.add_row(row)?;
            }
        }
        let staged = writer.close()?;

        let manifest = DeliveryManifest::new(spec.report_name, &self.window, staged);
        let files = delivery::archive(&manifest, &self.config.paths.output_dir)
            .context("Failed to archive report artifacts")?;
        delivery::hand_off(&manifest, &self.config.mail);

        info!(
            run_id = %summary.run_id,
            files = files.len(),
            partial = summary.partial_entities.len(),
            "Report run complete"
        );

        Ok(ReportOutcome {
            files,
            rows,
            policy: self.policy(),
            summary,
        })
    }
}

/// Split a composite catalog display name into an [`EntityKey`],
/// normalizing the entity part.
fn entity_key(normalizer: &NameNormalizer, display_name: &str) -> EntityKey {
    match display_name.split_once(':') {
        Some((group, name)) => EntityKey::new(group.trim(), normalizer.normalize(name)),
        None => EntityKey::new("", normalizer.normalize(display_name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_key_normalizes_name_part() {
        let normalizer = NameNormalizer::new(vec![crate::normalize::StripRule {
            suffix: " - GA4".into(),
            require_prefix: None,
        }]);
        assert_eq!(
            entity_key(&normalizer, "Library:Ancient World - GA4"),
            EntityKey::new("Library", "Ancient World")
        );
        assert_eq!(
            entity_key(&normalizer, "Orphan Site"),
            EntityKey::new("", "Orphan Site")
        );
    }

    #[test]
    fn test_specs_are_consistent() {
        for spec in [ReportSpec::analytics(), ReportSpec::storage()] {
            assert!(spec.sort_column < spec.schema.arity());
            assert!(!spec.lead_headers.is_empty());
        }
        assert_eq!(ReportSpec::analytics().schema.arity(), 3);
        assert_eq!(ReportSpec::storage().schema.arity(), 2);
    }
}
