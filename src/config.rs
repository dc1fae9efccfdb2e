use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::PulseError;

pub const DEFAULT_CONFIG_FILE: &str = "citation-pulse.json";
pub const DEFAULT_YEARS_BACK: u32 = 15;
pub const MAX_YEARS_BACK: u32 = 500;
pub const DEFAULT_MAX_PUBLICATIONS: usize = 20;
pub const DEFAULT_TIME_BUDGET_SECS: f64 = 45.0;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 10.0;
pub const DEFAULT_IDENTITY_CONCURRENCY: usize = 8;
pub const DEFAULT_IDENTITY_TASK_TIMEOUT_SECS: f64 = 15.0;
pub const DEFAULT_ORCID_MAX_RETRIES: usize = 2;
pub const DEFAULT_ORCID_API_BASE: &str = "https://pub.orcid.org/v3.0";
pub const DEFAULT_CROSSREF_API_BASE: &str = "https://api.crossref.org";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub years_back: Option<u32>,
    #[serde(default)]
    pub max_publications: Option<usize>,
    #[serde(default)]
    pub time_budget_seconds: Option<f64>,
    #[serde(default)]
    pub request_timeout_seconds: Option<f64>,
    #[serde(default)]
    pub identity_concurrency: Option<usize>,
    #[serde(default)]
    pub identity_task_timeout_seconds: Option<f64>,
    #[serde(default)]
    pub orcid_max_retries: Option<usize>,
    #[serde(default)]
    pub orcid_api_base: Option<String>,
    #[serde(default)]
    pub crossref_api_base: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub store_root: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub years_back: u32,
    pub max_publications: usize,
    pub time_budget: Duration,
    pub request_timeout: Duration,
    pub identity_concurrency: usize,
    pub identity_task_timeout: Duration,
    pub orcid_max_retries: usize,
    pub orcid_api_base: String,
    pub crossref_api_base: String,
    pub contact_email: Option<String>,
    pub store_root: Option<Utf8PathBuf>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            years_back: DEFAULT_YEARS_BACK,
            max_publications: DEFAULT_MAX_PUBLICATIONS,
            time_budget: Duration::from_secs_f64(DEFAULT_TIME_BUDGET_SECS),
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECS),
            identity_concurrency: DEFAULT_IDENTITY_CONCURRENCY,
            identity_task_timeout: Duration::from_secs_f64(DEFAULT_IDENTITY_TASK_TIMEOUT_SECS),
            orcid_max_retries: DEFAULT_ORCID_MAX_RETRIES,
            orcid_api_base: DEFAULT_ORCID_API_BASE.to_string(),
            crossref_api_base: DEFAULT_CROSSREF_API_BASE.to_string(),
            contact_email: None,
            store_root: None,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `citation-pulse.json` from the working directory.
    ///
    /// Only an explicitly named file is required to exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PulseError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            tracing::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PulseError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PulseError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PulseError> {
        let defaults = ResolvedConfig::default();

        let years_back = check_years_back(config.years_back.unwrap_or(defaults.years_back))?;
        let max_publications = config.max_publications.unwrap_or(defaults.max_publications);
        if max_publications == 0 {
            return Err(PulseError::InvalidParameter(
                "max_publications must be at least 1".to_string(),
            ));
        }
        let identity_concurrency = config
            .identity_concurrency
            .unwrap_or(defaults.identity_concurrency);
        if identity_concurrency == 0 {
            return Err(PulseError::InvalidParameter(
                "identity_concurrency must be at least 1".to_string(),
            ));
        }

        let store_root = match config.store_root {
            Some(root) if !root.trim().is_empty() => Some(Utf8PathBuf::from(root.trim())),
            _ => None,
        };

        Ok(ResolvedConfig {
            years_back,
            max_publications,
            time_budget: seconds(
                "time_budget_seconds",
                config.time_budget_seconds,
                defaults.time_budget,
            )?,
            request_timeout: seconds(
                "request_timeout_seconds",
                config.request_timeout_seconds,
                defaults.request_timeout,
            )?,
            identity_concurrency,
            identity_task_timeout: seconds(
                "identity_task_timeout_seconds",
                config.identity_task_timeout_seconds,
                defaults.identity_task_timeout,
            )?,
            orcid_max_retries: config.orcid_max_retries.unwrap_or(defaults.orcid_max_retries),
            orcid_api_base: config.orcid_api_base.unwrap_or(defaults.orcid_api_base),
            crossref_api_base: config.crossref_api_base.unwrap_or(defaults.crossref_api_base),
            contact_email: config
                .contact_email
                .filter(|email| !email.trim().is_empty()),
            store_root,
        })
    }
}

pub fn check_years_back(years_back: u32) -> Result<u32, PulseError> {
    if years_back == 0 || years_back > MAX_YEARS_BACK {
        return Err(PulseError::InvalidParameter(format!(
            "years_back must be between 1 and {MAX_YEARS_BACK}, got {years_back}"
        )));
    }
    Ok(years_back)
}

/// Parses a positive number of seconds that fits in a [`Duration`].
pub fn seconds(name: &str, value: Option<f64>, default: Duration) -> Result<Duration, PulseError> {
    let invalid = |secs: f64| {
        PulseError::InvalidParameter(format!(
            "{name} must be a positive number of seconds, got {secs}"
        ))
    };
    match value {
        None => Ok(default),
        Some(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs).map_err(|_| invalid(secs)),
        Some(secs) => Err(invalid(secs)),
    }
}
