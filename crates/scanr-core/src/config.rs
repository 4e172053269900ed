//! Settings file model.
//!
//! Settings are a single JSON document (`settings.json` by default). Every
//! field has a default, so a partial file, or no file at all, yields a
//! usable configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_SETTINGS_PATH: &str = "settings.json";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub log_filter: Option<String>,
    /// Verbosity 0 to 3 for settings files without `logFilter`.
    pub debug: Option<u8>,
    /// Append logs to this file in addition to stderr.
    pub log_file: Option<PathBuf>,
    /// Browser executable for the headless session.
    pub binary_path: Option<PathBuf>,
    pub user_agents: Vec<String>,
    pub session: SessionSettings,
    /// Where pages that never became ready are written.
    pub page_fail_dir: PathBuf,
    pub database: DatabaseSettings,
    pub api: ApiSettings,
    #[serde(alias = "parsers")]
    pub sources: Vec<SourceConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: None,
            debug: None,
            log_file: None,
            binary_path: None,
            user_agents: vec![DEFAULT_USER_AGENT.to_string()],
            session: SessionSettings::default(),
            page_fail_dir: PathBuf::from("log/pages"),
            database: DatabaseSettings::default(),
            api: ApiSettings::default(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionEngine {
    /// Plain HTTP fetch; ready selectors are checked in the static HTML.
    Http,
    /// Headless Chromium.
    Browser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    pub engine: SessionEngine,
    pub page_timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            engine: SessionEngine::Http,
            page_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Full connection URL. Takes precedence over the individual fields.
    pub url: Option<String>,
    pub host: String,
    pub name: String,
    pub user: String,
    pub pass: String,
    pub port: u16,
    pub max_connections: u32,
    /// Query table ceiling in megabytes.
    pub size_limit: f64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            name: "scanrus".to_string(),
            user: "root".to_string(),
            pass: String::new(),
            port: 5432,
            max_connections: 5,
            size_limit: 25000.0,
        }
    }
}

impl DatabaseSettings {
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "postgres://{}:{}@{}:{}/{}",
                urlencoding::encode(&self.user),
                urlencoding::encode(&self.pass),
                self.host,
                self.port,
                urlencoding::encode(&self.name)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// Catalog base URL including scheme.
    pub host: String,
    /// Sent verbatim in the `Authorization` header.
    pub token: Option<String>,
    /// Rows handled per publication cycle.
    pub limit: usize,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "http://localhost".to_string(),
            token: None,
            limit: 5,
            timeout_secs: 30,
        }
    }
}

/// Uniform random sleep range, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl IntervalRange {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    pub fn sample(&self) -> Duration {
        let secs = if self.min_secs >= self.max_secs {
            self.min_secs
        } else {
            rand::rng().random_range(self.min_secs..=self.max_secs)
        };
        Duration::from_secs(secs)
    }
}

/// One configured source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceConfig {
    /// Registered site integration name. Sources without one are skipped.
    pub scraper: Option<String>,
    pub disabled: bool,
    /// Bare host, e.g. `bestmods.io`.
    pub url: String,
    pub name: Option<String>,
    pub protocol: String,
    /// Site category slug to catalog category id.
    pub categories: BTreeMap<String, i64>,
    #[serde(alias = "categoryChildren")]
    pub cats_children: BTreeMap<String, BTreeMap<String, i64>>,

    pub find_enabled: bool,
    pub find_interval_min: u64,
    pub find_interval_max: u64,

    pub parse_enabled: bool,
    pub parse_interval_min: u64,
    pub parse_interval_max: u64,
    pub parse_existing: bool,
    pub parse_new: bool,

    pub add_enabled: bool,
    pub add_interval_min: u64,
    pub add_interval_max: u64,
    pub add_existing: bool,
    pub add_new: bool,

    /// Run publication selection without calling the catalog.
    pub test_mode: bool,
    pub skip_null_category: bool,
    pub log_page_fail_output: bool,
    /// Download extracted banner URLs and store the image base64-encoded.
    /// When off the URL itself is stored and sent.
    pub encode_banners: bool,
    pub cleanup_banners: bool,
    /// Owner ids whose items are never published.
    pub avoid_ids: Vec<String>,
    /// Rows handled per extraction cycle.
    pub limit: usize,
    /// Integration-specific options.
    pub site: serde_json::Value,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            scraper: None,
            disabled: false,
            url: String::new(),
            name: None,
            protocol: "https".to_string(),
            categories: BTreeMap::new(),
            cats_children: BTreeMap::new(),
            find_enabled: true,
            find_interval_min: 300,
            find_interval_max: 600,
            parse_enabled: true,
            parse_interval_min: 150,
            parse_interval_max: 300,
            parse_existing: false,
            parse_new: true,
            add_enabled: true,
            add_interval_min: 30,
            add_interval_max: 60,
            add_existing: false,
            add_new: true,
            test_mode: false,
            skip_null_category: true,
            log_page_fail_output: true,
            encode_banners: true,
            cleanup_banners: true,
            avoid_ids: Vec::new(),
            limit: 1,
            site: serde_json::Value::Null,
        }
    }
}

impl SourceConfig {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Has an integration and is not disabled.
    pub fn is_launchable(&self) -> bool {
        self.scraper.is_some() && !self.disabled
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    /// `{protocol}://{url}`.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.url)
    }

    pub fn find_interval(&self) -> IntervalRange {
        IntervalRange::new(self.find_interval_min, self.find_interval_max)
    }

    pub fn parse_interval(&self) -> IntervalRange {
        IntervalRange::new(self.parse_interval_min, self.parse_interval_max)
    }

    pub fn add_interval(&self) -> IntervalRange {
        IntervalRange::new(self.add_interval_min, self.add_interval_max)
    }

    /// Every configured category id, children included, sorted and unique.
    pub fn category_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .categories
            .values()
            .copied()
            .chain(
                self.cats_children
                    .values()
                    .flat_map(|children| children.values().copied()),
            )
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Category id for a site slug, checking children when the slug is not
    /// a top-level category.
    pub fn category_for_slug(&self, slug: &str) -> Option<i64> {
        self.categories.get(slug).copied().or_else(|| {
            self.cats_children
                .values()
                .find_map(|children| children.get(slug).copied())
        })
    }

    pub fn validate(&self, index: usize) -> Result<(), AppError> {
        let label = format!("source #{index} ({})", self.display_name());
        if self.url.trim().is_empty() {
            return Err(AppError::ConfigError(format!("{label}: url is empty")));
        }
        if self.limit == 0 {
            return Err(AppError::ConfigError(format!("{label}: limit must be at least 1")));
        }
        for (stage, range) in [
            ("find", self.find_interval()),
            ("parse", self.parse_interval()),
            ("add", self.add_interval()),
        ] {
            if range.min_secs == 0 {
                return Err(AppError::ConfigError(format!(
                    "{label}: {stage}IntervalMin must be at least 1"
                )));
            }
            if range.min_secs > range.max_secs {
                return Err(AppError::ConfigError(format!(
                    "{label}: {stage}IntervalMin ({}) is greater than {stage}IntervalMax ({})",
                    range.min_secs, range.max_secs
                )));
            }
        }
        Ok(())
    }
}

impl Settings {
    /// Load settings from `path`. A missing file yields defaults; a
    /// malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::ConfigError(format!("Invalid settings file: {e}")))
    }

    /// Apply `SCANR_API_HOST` and `SCANR_API_TOKEN` overrides.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("SCANR_API_HOST") {
            self.api.host = host;
        }
        if let Ok(token) = std::env::var("SCANR_API_TOKEN") {
            self.api.token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.api.limit == 0 {
            return Err(AppError::ConfigError("api.limit must be at least 1".into()));
        }
        if self.database.size_limit <= 0.0 {
            return Err(AppError::ConfigError(
                "database.sizeLimit must be positive".into(),
            ));
        }
        for (index, source) in self.sources.iter().enumerate() {
            if source.is_launchable() {
                source.validate(index)?;
            }
        }
        Ok(())
    }

    pub fn source(&self, index: usize) -> Result<&SourceConfig, AppError> {
        self.sources
            .get(index)
            .ok_or_else(|| AppError::ConfigError(format!("No source at index {index}")))
    }

    /// `logFilter` when set, otherwise a `scanr=<level>` directive derived
    /// from `debug` (info when neither is set).
    pub fn log_directive(&self) -> String {
        if let Some(filter) = &self.log_filter {
            return filter.clone();
        }
        let level = match self.debug.unwrap_or(1) {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        format!("scanr={level}")
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.session.page_timeout_secs)
    }

    /// A copy safe to print: password and token are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.database.pass.is_empty() {
            copy.database.pass = "***".to_string();
        }
        if let Some(url) = copy.database.url.as_mut() {
            *url = mask_url_password(url);
        }
        if copy.api.token.is_some() {
            copy.api.token = Some("***".to_string());
        }
        copy
    }
}

fn mask_url_password(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}
