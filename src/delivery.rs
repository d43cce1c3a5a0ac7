//! Artifact staging and delivery hand-off
//!
//! Reports are generated in a staging directory and only copied into
//! the output directory once both artifacts are finalized, so a failed
//! run never leaves a partial report behind. Mail transport itself
//! lives outside this crate; the hand-off here produces the manifest a
//! transport needs (report name, resolved window, file set) and logs
//! it.

use crate::config::MailConfig;
use crate::logging;
use crate::period::PeriodWindow;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a delivery transport needs to know about a finished report.
#[derive(Debug, Clone)]
pub struct DeliveryManifest {
    pub report_name: String,
    pub period_label: String,
    pub window: String,
    pub files: Vec<PathBuf>,
}

impl DeliveryManifest {
    pub fn new(report_name: &str, window: &PeriodWindow, files: Vec<PathBuf>) -> Self {
        Self {
            report_name: report_name.to_string(),
            period_label: window.period_label(),
            window: window.describe(),
            files,
        }
    }

    /// Human-readable subject line for the report.
    pub fn describe(&self) -> String {
        format!(
            "{} Report for {} - {}",
            self.report_name, self.period_label, self.window
        )
    }
}

/// Seam for the external mail transport.
pub trait MailTransport {
    fn send(&self, manifest: &DeliveryManifest, mail: &MailConfig) -> Result<()>;
}

/// Copy the finalized artifacts into the output directory. Returns the
/// archived paths.
pub fn archive(manifest: &DeliveryManifest, output_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let mut archived = Vec::with_capacity(manifest.files.len());
    for file in &manifest.files {
        let name = file
            .file_name()
            .with_context(|| format!("Artifact {} has no file name", file.display()))?;
        let target = output_dir.join(name);
        std::fs::copy(file, &target)
            .with_context(|| format!("Failed to copy {} to {}", file.display(), target.display()))?;
        debug!(target = %target.display(), "Archived report artifact");
        archived.push(target);
    }
    Ok(archived)
}

/// Announce the finished report to the delivery side. Transport is an
/// external collaborator; this records what it would be handed.
pub fn hand_off(manifest: &DeliveryManifest, mail: &MailConfig) {
    info!(
        subject = %manifest.describe(),
        to = ?mail.to,
        files = manifest.files.len(),
        "Report ready for delivery"
    );
}

/// Scratch directory the writer produces artifacts in before they are
/// archived. Removed on drop, best effort.
pub struct Staging {
    dir: PathBuf,
}

impl Staging {
    pub fn new() -> Result<Self> {
        // run id plus a sequence number so concurrent runs in one
        // process cannot collide
        static SEQ: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("quarterly-report-{}-{seq}", logging::run_id()));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create staging dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::FiscalCalendar;
    use chrono::NaiveDate;

    fn window() -> PeriodWindow {
        FiscalCalendar::new(9)
            .resolve(
                NaiveDate::from_ymd_opt(2016, 10, 15).unwrap(),
                Some("Q4/2016"),
            )
            .unwrap()
    }

    #[test]
    fn test_manifest_description() {
        let manifest = DeliveryManifest::new("Analytics", &window(), vec![]);
        assert_eq!(
            manifest.describe(),
            "Analytics Report for Q4/2016 - 2016-06-01 to 2016-08-31"
        );
    }

    #[test]
    fn test_archive_copies_files() {
        let staging = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let src = staging.path().join("report_Q4_2016.csv");
        std::fs::write(&src, "a,b\n").unwrap();

        let manifest = DeliveryManifest::new("Analytics", &window(), vec![src]);
        let archived = archive(&manifest, output.path()).unwrap();

        assert_eq!(archived.len(), 1);
        assert_eq!(
            std::fs::read_to_string(&archived[0]).unwrap(),
            "a,b\n"
        );
    }

    #[test]
    fn test_staging_dir_cleanup() {
        let path;
        {
            let staging = Staging::new().unwrap();
            path = staging.dir().to_path_buf();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
