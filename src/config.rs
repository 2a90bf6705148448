//! Configuration: config file, defaults, and the validated run config.
//!
//! Settings are resolved with this precedence:
//!
//! 1. command-line flags (and `ELKTAIL_*` environment variables, via clap)
//! 2. the TOML config file (`$HOME/.elktail.toml` unless `--config` is given)
//! 3. built-in defaults
//!
//! ```toml
//! index = "logstash-[0-9].*"
//! url = "http://127.0.0.1:9200"
//! page_size = 50
//! interval_ms = 1000
//! timestamp_field = "@timestamp"
//! tiebreaker = "_id"
//! max_retries = 5
//! page_timeout_secs = 30
//! ```
//!
//! `index` and `url` given on the command line are written back to the file
//! by [`persist_flags`] so the next run picks them up.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cursor::StartPosition;
use crate::fetch::RetryPolicy;
use crate::query::QuerySpec;

pub const DEFAULT_INDEX_PATTERN: &str = "logstash-[0-9].*";
pub const DEFAULT_URL: &str = "http://127.0.0.1:9200";
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_TIMESTAMP_FIELD: &str = "@timestamp";
/// Sortable out of the box up to Elasticsearch 7. Elasticsearch 8 needs
/// `indices.id_field_data.enabled`, or a keyword field configured instead.
pub const DEFAULT_TIEBREAKER: &str = "_id";
pub const CONFIG_FILE_NAME: &str = ".elktail.toml";

/// Contents of the TOML config file. Every key is optional.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiebreaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_timeout_secs: Option<u64>,
}

/// Values supplied on the command line. `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub index: Option<String>,
    pub url: Option<String>,
    pub query: Option<String>,
    pub page_size: Option<usize>,
    pub interval_ms: Option<u64>,
    pub timestamp_field: Option<String>,
    pub tiebreaker: Option<String>,
    pub max_retries: Option<u32>,
    pub after: Option<DateTime<Utc>>,
    pub from_start: bool,
    pub list_only: bool,
    pub checkpoint: Option<PathBuf>,
}

/// The validated, immutable configuration of one tailing run.
#[derive(Debug, Clone)]
pub struct TailConfig {
    pub url: Url,
    pub index_pattern: String,
    /// Free-text query; empty matches every document.
    pub query: String,
    pub page_size: usize,
    /// Lower bound of the first cycle when no checkpoint exists.
    pub start: StartPosition,
    /// Run a single cycle and exit.
    pub list_only: bool,
    pub timestamp_field: String,
    pub tiebreaker: String,
    pub interval: Duration,
    pub retry: RetryPolicy,
    pub page_timeout: Duration,
    /// Consecutive invalid-query cycles tolerated before giving up.
    pub max_invalid_query_streak: u32,
    pub checkpoint: Option<PathBuf>,
}

impl TailConfig {
    /// A config with default tunables.
    pub fn new(url: Url, index_pattern: &str, query: &str, start: StartPosition) -> Self {
        Self {
            url,
            index_pattern: index_pattern.to_string(),
            query: query.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            start,
            list_only: false,
            timestamp_field: DEFAULT_TIMESTAMP_FIELD.to_string(),
            tiebreaker: DEFAULT_TIEBREAKER.to_string(),
            interval: Duration::from_secs(1),
            retry: RetryPolicy::default(),
            page_timeout: Duration::from_secs(30),
            max_invalid_query_streak: 3,
            checkpoint: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.url.scheme() {
            "http" | "https" => {}
            other => bail!("url scheme must be http or https, got '{}'", other),
        }
        if self.index_pattern.trim().is_empty() {
            bail!("index pattern must not be empty");
        }
        if self.page_size == 0 {
            bail!("page_size must be >= 1");
        }
        if self.interval.is_zero() {
            bail!("interval must be > 0");
        }
        if self.page_timeout.is_zero() {
            bail!("page timeout must be > 0");
        }
        if self.timestamp_field.trim().is_empty() {
            bail!("timestamp_field must not be empty");
        }
        if self.tiebreaker.trim().is_empty() {
            bail!("tiebreaker must not be empty");
        }
        if self.max_invalid_query_streak == 0 {
            bail!("max_invalid_query_streak must be >= 1");
        }
        Ok(())
    }

    pub fn query_spec(&self) -> QuerySpec<'_> {
        QuerySpec {
            index: &self.index_pattern,
            query: &self.query,
            timestamp_field: &self.timestamp_field,
            tiebreaker: &self.tiebreaker,
            page_size: self.page_size,
        }
    }
}

/// Parse an `--after` value: RFC 3339, or `YYYY-MM-DD` meaning midnight UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid timestamp '{}': expected RFC 3339 or YYYY-MM-DD", s))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// `$HOME/.elktail.toml`, if a home directory can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

/// Read the config file. A missing file yields an empty config.
pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

/// Merge command-line overrides over the file config and defaults.
pub fn resolve(file: &FileConfig, overrides: Overrides) -> Result<TailConfig> {
    let url_str = overrides
        .url
        .or_else(|| file.url.clone())
        .unwrap_or_else(|| DEFAULT_URL.to_string());
    let url = Url::parse(&url_str).with_context(|| format!("Invalid URL: {}", url_str))?;

    let index = overrides
        .index
        .or_else(|| file.index.clone())
        .unwrap_or_else(|| DEFAULT_INDEX_PATTERN.to_string());

    if overrides.from_start && overrides.after.is_some() {
        bail!("--after and --from-start are mutually exclusive");
    }
    let start = match overrides.after {
        Some(ts) => StartPosition::After(ts),
        None if overrides.from_start => StartPosition::Earliest,
        None => StartPosition::Now,
    };

    let mut config = TailConfig::new(
        url,
        &index,
        overrides.query.as_deref().unwrap_or(""),
        start,
    );
    config.list_only = overrides.list_only;
    config.checkpoint = overrides.checkpoint;

    if let Some(size) = overrides.page_size.or(file.page_size) {
        config.page_size = size;
    }
    if let Some(ms) = overrides.interval_ms.or(file.interval_ms) {
        config.interval = Duration::from_millis(ms);
    }
    if let Some(field) = overrides.timestamp_field.or_else(|| file.timestamp_field.clone()) {
        config.timestamp_field = field;
    }
    if let Some(tiebreaker) = overrides.tiebreaker.or_else(|| file.tiebreaker.clone()) {
        config.tiebreaker = tiebreaker;
    }
    if let Some(retries) = overrides.max_retries.or(file.max_retries) {
        config.retry.max_retries = retries;
    }
    if let Some(secs) = file.page_timeout_secs {
        config.page_timeout = Duration::from_secs(secs);
    }

    config.validate()?;
    Ok(config)
}

/// Write `index` and `url` back to the config file, keeping other keys.
///
/// Returns `true` if the file was rewritten.
pub fn persist_flags(path: &Path, index: Option<&str>, url: Option<&str>) -> Result<bool> {
    if index.is_none() && url.is_none() {
        return Ok(false);
    }
    let mut file = load_file_config(path)?;
    let before = file.clone();
    if let Some(index) = index {
        file.index = Some(index.to_string());
    }
    if let Some(url) = url {
        file.url = Some(url.to_string());
    }
    if file == before && path.exists() {
        return Ok(false);
    }

    let content = toml::to_string_pretty(&file).context("Failed to encode config file")?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(true)
}
