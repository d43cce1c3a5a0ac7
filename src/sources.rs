//! Metric source adapters
//!
//! The reporting core consumes two contracts: an entity catalog
//! (`list_entities` -> ordered `(display_name, entity_id)` pairs, used
//! once per run per source) and a metric fetch (`fetch(entity_id,
//! start, end)` -> metric vector or an explicitly empty result). Both
//! are served by [`SourceClient`]:
//!
//! - [`StaticSource`]: in-memory data, loadable from a JSON snapshot
//!   file of a prior export. Used for offline runs and tests.
//! - `HttpSource` (feature `http-source`): a JSON-over-HTTP gateway in
//!   front of the analytics backends.
//!
//! Transient failures are retried a bounded number of times under a
//! per-request timeout; exhaustion surfaces as a recoverable
//! [`ReportError::EntityFetch`], while an authentication failure is
//! fatal for the whole run.

use crate::error::ReportError;
use crate::models::{FetchOutcome, MetricVector, SourceTag};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("transient failure: {0}")]
    Transient(String),
}

/// One catalog listing entry, pre-normalization. The optional link is
/// the backend's own console URL for the entity, carried into the
/// report as a hyperlink cell.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub display_name: String,
    pub entity_id: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// Bounded retry behavior for source fetches.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Run `op` under the retry policy. Authentication failures abort
/// immediately; transient failures and timeouts are retried until the
/// attempt budget is exhausted.
pub async fn with_retry<F, Fut>(
    policy: RetryPolicy,
    entity: &str,
    op: F,
) -> std::result::Result<FetchOutcome, ReportError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<FetchOutcome, SourceError>>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match tokio::time::timeout(policy.timeout, op()).await {
            Ok(Ok(outcome)) => return Ok(outcome),
            Ok(Err(SourceError::Authentication(reason))) => {
                return Err(ReportError::SourceAuthentication {
                    service: entity.to_string(),
                    reason,
                });
            }
            Ok(Err(SourceError::Transient(reason))) => {
                warn!(entity, attempt, %reason, "Transient fetch failure");
            }
            Err(_) => {
                warn!(entity, attempt, timeout = ?policy.timeout, "Fetch timed out");
            }
        }
    }
    Err(ReportError::EntityFetch {
        entity: entity.to_string(),
        attempts,
    })
}

/// A configured metric backend.
pub enum SourceClient {
    Static(StaticSource),
    #[cfg(feature = "http-source")]
    Http(HttpSource),
}

impl SourceClient {
    pub fn tag(&self) -> &SourceTag {
        match self {
            SourceClient::Static(s) => &s.tag,
            #[cfg(feature = "http-source")]
            SourceClient::Http(s) => &s.tag,
        }
    }

    /// List the entities this source reports, in catalog order.
    pub async fn list_entities(&self) -> std::result::Result<Vec<CatalogEntry>, SourceError> {
        match self {
            SourceClient::Static(s) => Ok(s.entities.clone()),
            #[cfg(feature = "http-source")]
            SourceClient::Http(s) => s.list_entities().await,
        }
    }

    /// One fetch attempt for one entity and window.
    pub async fn fetch(
        &self,
        entity_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> std::result::Result<FetchOutcome, SourceError> {
        match self {
            SourceClient::Static(s) => Ok(s.fetch(entity_id, start, end)),
            #[cfg(feature = "http-source")]
            SourceClient::Http(s) => s.fetch(entity_id, start, end).await,
        }
    }

    /// Fetch under the retry policy.
    pub async fn fetch_with_retry(
        &self,
        policy: RetryPolicy,
        entity_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> std::result::Result<FetchOutcome, ReportError> {
        with_retry(policy, entity_id, || self.fetch(entity_id, start, end)).await
    }
}

// ---------------------------------------------------------------------
// Static / snapshot source

#[derive(Debug, Deserialize)]
struct Snapshot {
    entities: Vec<CatalogEntry>,
    metrics: Vec<SnapshotMetrics>,
}

#[derive(Debug, Deserialize)]
struct SnapshotMetrics {
    entity_id: String,
    start: NaiveDate,
    end: NaiveDate,
    values: Vec<u64>,
}

/// In-memory source, optionally loaded from a JSON snapshot of a prior
/// export. An entity/window pair with no snapshot entry fetches as
/// [`FetchOutcome::Empty`].
pub struct StaticSource {
    pub tag: SourceTag,
    entities: Vec<CatalogEntry>,
    metrics: BTreeMap<(String, NaiveDate, NaiveDate), MetricVector>,
}

impl StaticSource {
    pub fn new(tag: SourceTag) -> Self {
        Self {
            tag,
            entities: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn from_snapshot_file(tag: SourceTag, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;

        let mut source = Self::new(tag);
        source.entities = snapshot.entities;
        for m in snapshot.metrics {
            source
                .metrics
                .insert((m.entity_id, m.start, m.end), MetricVector::from(m.values));
        }
        debug!(
            source = %source.tag,
            entities = source.entities.len(),
            windows = source.metrics.len(),
            "Loaded snapshot source"
        );
        Ok(source)
    }

    pub fn push_entity(&mut self, display_name: impl Into<String>, entity_id: impl Into<String>) {
        self.entities.push(CatalogEntry {
            display_name: display_name.into(),
            entity_id: entity_id.into(),
            link: None,
        });
    }

    pub fn push_entity_with_link(
        &mut self,
        display_name: impl Into<String>,
        entity_id: impl Into<String>,
        link: impl Into<String>,
    ) {
        self.entities.push(CatalogEntry {
            display_name: display_name.into(),
            entity_id: entity_id.into(),
            link: Some(link.into()),
        });
    }

    pub fn insert_metrics(
        &mut self,
        entity_id: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
        values: Vec<u64>,
    ) {
        self.metrics
            .insert((entity_id.into(), start, end), MetricVector::from(values));
    }

    fn fetch(&self, entity_id: &str, start: NaiveDate, end: NaiveDate) -> FetchOutcome {
        match self.metrics.get(&(entity_id.to_string(), start, end)) {
            Some(vector) => FetchOutcome::Present(vector.clone()),
            None => FetchOutcome::Empty,
        }
    }
}

// ---------------------------------------------------------------------
// HTTP source

#[cfg(feature = "http-source")]
pub use http::{HttpSource, HttpTitleCatalog};

#[cfg(feature = "http-source")]
mod http {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct MetricsResponse {
        values: Option<Vec<u64>>,
    }

    /// JSON-over-HTTP metric gateway. `GET {base}/entities` lists the
    /// catalog; `GET {base}/metrics?entity=..&start=..&end=..` returns
    /// `{"values": [..]}` or an empty body for an absent result.
    pub struct HttpSource {
        pub tag: SourceTag,
        base_url: String,
        token: Option<String>,
        client: reqwest::Client,
    }

    impl HttpSource {
        pub fn new(tag: SourceTag, base_url: impl Into<String>, token: Option<String>) -> Self {
            Self {
                tag,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                token,
                client: reqwest::Client::new(),
            }
        }

        fn get(&self, url: String) -> reqwest::RequestBuilder {
            let req = self.client.get(url);
            match &self.token {
                Some(token) => req.bearer_auth(token),
                None => req,
            }
        }

        pub(super) async fn list_entities(
            &self,
        ) -> std::result::Result<Vec<CatalogEntry>, SourceError> {
            let url = format!("{}/entities", self.base_url);
            let response = self
                .get(url)
                .send()
                .await
                .map_err(|e| SourceError::Transient(e.to_string()))?;
            let response = check_status(response)?;
            response
                .json()
                .await
                .map_err(|e| SourceError::Transient(e.to_string()))
        }

        pub(super) async fn fetch(
            &self,
            entity_id: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> std::result::Result<FetchOutcome, SourceError> {
            let url = format!(
                "{}/metrics?entity={}&start={}&end={}",
                self.base_url, entity_id, start, end
            );
            let response = self
                .get(url)
                .send()
                .await
                .map_err(|e| SourceError::Transient(e.to_string()))?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(FetchOutcome::Empty);
            }
            let response = check_status(response)?;
            let body: MetricsResponse = response
                .json()
                .await
                .map_err(|e| SourceError::Transient(e.to_string()))?;
            Ok(match body.values {
                Some(values) => FetchOutcome::Present(MetricVector::from(values)),
                None => FetchOutcome::Empty,
            })
        }
    }

    fn check_status(
        response: reqwest::Response,
    ) -> std::result::Result<reqwest::Response, SourceError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(SourceError::Authentication(format!(
                "server returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(SourceError::Transient(format!("server returned {status}")));
        }
        Ok(response)
    }

    #[derive(Debug, Deserialize)]
    struct NamedResource {
        name: String,
    }

    /// Resolves human-readable titles for storage entities. The layout
    /// mirrors the archival store: `<base>/<provider>/partner_url` and
    /// `<base>/<provider>/<collection>/collection_url` each hold a URL
    /// whose JSON body carries the display name.
    pub struct HttpTitleCatalog {
        base_dir: std::path::PathBuf,
        client: reqwest::Client,
    }

    impl HttpTitleCatalog {
        pub fn new(base_dir: std::path::PathBuf) -> Self {
            Self {
                base_dir,
                client: reqwest::Client::new(),
            }
        }

        pub async fn title_for(&self, provider: &str, collection: &str) -> Option<String> {
            let partner = self
                .resolve(self.base_dir.join(provider).join("partner_url"))
                .await;
            let collection = self
                .resolve(
                    self.base_dir
                        .join(provider)
                        .join(collection)
                        .join("collection_url"),
                )
                .await;
            match (partner, collection) {
                (Some(p), Some(c)) => Some(format!("{p} - {c}")),
                (Some(p), None) => Some(p),
                (None, Some(c)) => Some(c),
                (None, None) => None,
            }
        }

        async fn resolve(&self, url_file: std::path::PathBuf) -> Option<String> {
            let contents = tokio::fs::read_to_string(&url_file).await.ok()?;
            let url = contents.lines().next()?.trim().to_string();
            let response = self.client.get(&url).send().await.ok()?;
            let resource: NamedResource = response.json().await.ok()?;
            debug!(url_file = %url_file.display(), name = %resource.name, "Resolved title");
            Some(resource.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_static_source_fetch_and_empty() {
        let mut source = StaticSource::new(SourceTag::new("snapshot"));
        source.push_entity("Acme", "prop-1");
        source.insert_metrics("prop-1", d(2016, 6, 1), d(2016, 8, 31), vec![100, 50, 200]);

        let client = SourceClient::Static(source);
        let hit = client.fetch("prop-1", d(2016, 6, 1), d(2016, 8, 31)).await.unwrap();
        assert_eq!(
            hit,
            FetchOutcome::Present(MetricVector::from(vec![100, 50, 200]))
        );

        let miss = client.fetch("prop-1", d(2016, 3, 1), d(2016, 5, 31)).await.unwrap();
        assert_eq!(miss, FetchOutcome::Empty);
    }

    #[tokio::test]
    async fn test_snapshot_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(
            &path,
            r#"{
              "entities": [{"display_name": "Acme - GA4", "entity_id": "prop-1"}],
              "metrics": [
                {"entity_id": "prop-1", "start": "2016-06-01", "end": "2016-08-31", "values": [100, 50, 200]}
              ]
            }"#,
        )
        .unwrap();

        let source = StaticSource::from_snapshot_file(SourceTag::new("snapshot"), &path).unwrap();
        assert_eq!(source.entities.len(), 1);
        assert_eq!(source.entities[0].display_name, "Acme - GA4");
        assert_eq!(
            source.fetch("prop-1", d(2016, 6, 1), d(2016, 8, 31)),
            FetchOutcome::Present(MetricVector::from(vec![100, 50, 200]))
        );
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_recoverable_fetch_error() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(policy(), "acme", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SourceError::Transient("connection reset".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(ReportError::EntityFetch { entity, attempts }) => {
                assert_eq!(entity, "acme");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected EntityFetch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_auth_failure_short_circuits() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(policy(), "acme", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SourceError::Authentication("token expired".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(ReportError::SourceAuthentication { .. })
        ));
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicUsize::new(0);
        let result = with_retry(policy(), "acme", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(SourceError::Transient("flaky".into()))
                } else {
                    Ok(FetchOutcome::Present(MetricVector::from(vec![7])))
                }
            }
        })
        .await;

        assert_eq!(
            result.unwrap(),
            FetchOutcome::Present(MetricVector::from(vec![7]))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
