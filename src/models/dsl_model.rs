use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{LoadTestError, Result};
use crate::models::metrics::{ERRORS, HTTP_REQ_DURATION};
use crate::models::threshold::{parse_thresholds, Threshold};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/netflix";
pub const DEFAULT_SUMMARY_PATH: &str = "baseline_results.json";
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Deserialize, Clone)]
pub struct DslConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    pub stages: Vec<Stage>,

    #[serde(default = "default_thresholds")]
    pub thresholds: BTreeMap<String, Vec<String>>,

    /// Per-request timeout in milliseconds.
    #[serde(default)]
    pub timeout: Option<u64>,

    #[serde(default = "default_graceful_stop", deserialize_with = "de_duration")]
    pub graceful_stop: Duration,

    #[serde(default = "default_summary_path")]
    pub summary_path: PathBuf,

    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,

    #[serde(default)]
    pub scenario: ScenarioConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Stage {
    #[serde(deserialize_with = "de_duration")]
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Parameters of the browsing iteration every virtual user repeats.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScenarioConfig {
    pub page_size: u32,
    pub max_page: u32,
    pub max_show_id: u32,
    pub search_terms: Vec<String>,
    /// Pre-encoded query strings, sent verbatim.
    pub filters: Vec<String>,
    pub top_n: u32,
    #[serde(deserialize_with = "de_duration")]
    pub pause: Duration,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            max_page: 5,
            max_show_id: 500,
            search_terms: ["love", "world", "man", "dark", "night", "king", "life"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            filters: [
                "category=Movie&country=United%20States",
                "category=TV%20Show&rating=TV-MA",
                "release_year=2020",
                "genre=Comedy&category=Movie",
                "country=India&rating=TV-14",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            top_n: 10,
            pause: Duration::from_millis(500),
        }
    }
}

impl Default for DslConfig {
    /// The baseline run: warm-up, ramp, sustained, peak, cool-down.
    fn default() -> Self {
        Self {
            name: default_name(),
            base_url: default_base_url(),
            stages: vec![
                Stage::new(Duration::from_secs(30), 10),
                Stage::new(Duration::from_secs(30), 30),
                Stage::new(Duration::from_secs(60), 50),
                Stage::new(Duration::from_secs(30), 100),
                Stage::new(Duration::from_secs(30), 0),
            ],
            thresholds: default_thresholds(),
            timeout: None,
            graceful_stop: default_graceful_stop(),
            summary_path: default_summary_path(),
            seed: None,
            headers: None,
            scenario: ScenarioConfig::default(),
        }
    }
}

impl DslConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: DslConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the whole configuration and returns the parsed thresholds.
    pub fn validate(&self) -> Result<Vec<Threshold>> {
        if self.stages.is_empty() {
            return Err(LoadTestError::InvalidConfig(
                "at least one stage is required".to_string(),
            ));
        }
        self.base()?;

        let scenario = &self.scenario;
        if scenario.search_terms.is_empty() {
            return Err(LoadTestError::InvalidConfig(
                "scenario.search_terms must not be empty".to_string(),
            ));
        }
        if scenario.filters.is_empty() {
            return Err(LoadTestError::InvalidConfig(
                "scenario.filters must not be empty".to_string(),
            ));
        }
        if scenario.max_page == 0 || scenario.max_show_id == 0 {
            return Err(LoadTestError::InvalidConfig(
                "scenario.max_page and scenario.max_show_id must be at least 1".to_string(),
            ));
        }
        if self.timeout == Some(0) {
            return Err(LoadTestError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }

        parse_thresholds(&self.thresholds)
    }

    /// The API base URL, without a trailing slash.
    pub fn base(&self) -> Result<Url> {
        let trimmed = self.base_url.trim_end_matches('/');
        let url = Url::parse(trimmed).map_err(|e| LoadTestError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(LoadTestError::InvalidUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.unwrap_or(DEFAULT_TIMEOUT_MS))
    }
}

fn default_name() -> String {
    "netflix-baseline".to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_thresholds() -> BTreeMap<String, Vec<String>> {
    let mut thresholds = BTreeMap::new();
    thresholds.insert(HTTP_REQ_DURATION.to_string(), vec!["p(95)<2000".to_string()]);
    thresholds.insert(ERRORS.to_string(), vec!["rate<0.1".to_string()]);
    thresholds
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}

fn default_summary_path() -> PathBuf {
    PathBuf::from(DEFAULT_SUMMARY_PATH)
}

fn de_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

/// Parses `"500ms"`, `"30s"`, `"1m"`, `"1h"` and compounds such as `"1m30s"`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let invalid = || LoadTestError::InvalidDuration(s.to_string());
    let mut rest = s.trim();
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_ms = 0.0;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..num_end].parse().map_err(|_| invalid())?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let factor = match &rest[..unit_end] {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            _ => return Err(invalid()),
        };
        total_ms += value * factor;
        rest = &rest[unit_end..];
    }

    Duration::try_from_secs_f64(total_ms / 1000.0).map_err(|_| invalid())
}
