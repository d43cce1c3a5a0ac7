//! Production configuration system
//!
//! Provides centralized configuration management with:
//! - Environment variable support
//! - Config file loading (optional)
//! - Runtime defaults
//! - Validation and type safety

use crate::normalize::StripRule;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::fs;
use std::sync::OnceLock;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Report behavior configuration
    pub report: ReportConfig,

    /// Metric source configuration
    pub sources: SourcesConfig,

    /// Storage report configuration
    pub storage: StorageConfig,

    /// Mail delivery configuration
    pub mail: MailConfig,

    /// Paths configuration
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// First month of the fiscal year (1-12).
    pub fiscal_start_month: u32,
    /// Rendering for a missing baseline: "empty" or "na".
    pub no_baseline: String,
    /// Leading rows excluded from spreadsheet auto-sizing.
    pub header_offset: usize,
    /// Display-name suffixes stripped before reconciliation.
    pub strip_patterns: Vec<StripRule>,
    /// Entity names excluded from the report entirely.
    pub skip_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Fetch attempts per entity and window before giving up.
    pub max_retries: usize,
    /// Analytics backends to query.
    pub analytics: Vec<SourceEndpoint>,
}

/// One configured metric backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEndpoint {
    /// Tag recorded in `present_in` and the single-source audit.
    pub tag: String,
    /// "snapshot" (JSON file) or "http".
    pub kind: String,
    /// Snapshot file path or HTTP base URL.
    pub location: String,
    /// Bearer token for HTTP backends.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the archived storage report files.
    pub report_dir: PathBuf,
    /// Archival store root holding partner_url/collection_url files,
    /// used to resolve display titles.
    pub title_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub from: String,
    pub to: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub output_dir: PathBuf,
    pub log_directory: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            report: ReportConfig::default(),
            sources: SourcesConfig::default(),
            storage: StorageConfig::default(),
            mail: MailConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "ERROR".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            fiscal_start_month: 9,
            no_baseline: "empty".to_string(),
            header_offset: 3,
            strip_patterns: vec![
                StripRule {
                    suffix: " - GA4".to_string(),
                    require_prefix: None,
                },
                StripRule {
                    suffix: " Hosted at New York University".to_string(),
                    require_prefix: Some("Finding Aids".to_string()),
                },
            ],
            skip_list: Vec::new(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            analytics: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            report_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("storage-reports")
                .join("data"),
            title_dir: None,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: String::new(),
            to: Vec::new(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")),
            log_directory: PathBuf::from("logs"),
        }
    }
}

impl Config {
    /// Load configuration from environment, file, and defaults
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        // Try to load from config file if it exists
        let config_paths = [
            PathBuf::from("quarterly-report.toml"),
            PathBuf::from(".quarterly-report.toml"),
            dirs::config_dir()
                .map(|d| d.join("quarterly-report").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        // Override with environment variables
        config.apply_env_overrides()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Logging overrides
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        // Report overrides
        if let Ok(val) = env::var("QTR_REPORT_FISCAL_START_MONTH") {
            self.report.fiscal_start_month = val.parse()
                .context("Invalid QTR_REPORT_FISCAL_START_MONTH")?;
        }
        if let Ok(val) = env::var("QTR_REPORT_NO_BASELINE") {
            self.report.no_baseline = val;
        }

        // Source overrides
        if let Ok(val) = env::var("QTR_REPORT_TIMEOUT_SECS") {
            self.sources.timeout_secs = val.parse()
                .context("Invalid QTR_REPORT_TIMEOUT_SECS")?;
        }
        if let Ok(val) = env::var("QTR_REPORT_MAX_RETRIES") {
            self.sources.max_retries = val.parse()
                .context("Invalid QTR_REPORT_MAX_RETRIES")?;
        }

        // Path overrides
        if let Ok(val) = env::var("QTR_REPORT_OUTPUT_DIR") {
            self.paths.output_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("QTR_REPORT_STORAGE_DIR") {
            self.storage.report_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("QTR_REPORT_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(1..=12).contains(&self.report.fiscal_start_month) {
            return Err(anyhow::anyhow!(
                "Fiscal start month must be between 1 and 12, got {}",
                self.report.fiscal_start_month
            ));
        }

        if !matches!(self.report.no_baseline.as_str(), "empty" | "na") {
            return Err(anyhow::anyhow!(
                "no_baseline must be 'empty' or 'na', got '{}'",
                self.report.no_baseline
            ));
        }

        if self.sources.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Source timeout must be greater than 0"));
        }

        if self.sources.max_retries == 0 {
            return Err(anyhow::anyhow!("Max retries must be greater than 0"));
        }

        for endpoint in &self.sources.analytics {
            if !matches!(endpoint.kind.as_str(), "snapshot" | "http") {
                return Err(anyhow::anyhow!(
                    "Source '{}' has unknown kind '{}', expected 'snapshot' or 'http'",
                    endpoint.tag,
                    endpoint.kind
                ));
            }
        }

        Ok(())
    }

    /// Save current configuration to file
    #[allow(dead_code)]
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");

        Ok(())
    }
}

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration instance
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::load().unwrap_or_else(|e| {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "ERROR");
        assert_eq!(config.report.fiscal_start_month, 9);
        assert_eq!(config.report.no_baseline, "empty");
        assert_eq!(config.sources.max_retries, 3);
        assert_eq!(config.report.strip_patterns.len(), 2);
    }

    #[test]
    fn test_env_override() {
        env::set_var("QTR_REPORT_FISCAL_START_MONTH", "7");
        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.report.fiscal_start_month, 7);
        env::remove_var("QTR_REPORT_FISCAL_START_MONTH");
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.report.fiscal_start_month = 13;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.report.no_baseline = "blank".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sources.analytics.push(SourceEndpoint {
            tag: "ga".to_string(),
            kind: "carrier-pigeon".to_string(),
            location: "coop".to_string(),
            token: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[report]
fiscal_start_month = 7
no_baseline = "na"
skip_list = ["Sandbox"]

[[sources.analytics]]
tag = "property"
kind = "http"
location = "https://analytics.example.edu/api"
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.report.fiscal_start_month, 7);
        assert_eq!(config.report.no_baseline, "na");
        assert_eq!(config.report.skip_list, vec!["Sandbox".to_string()]);
        assert_eq!(config.sources.analytics.len(), 1);
        assert_eq!(config.sources.analytics[0].kind, "http");
        // unspecified sections keep defaults
        assert_eq!(config.sources.max_retries, 3);
    }
}
