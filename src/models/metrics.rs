use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::utils::hardware::HostInfo;

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const DATA_RECEIVED: &str = "data_received";
pub const CHECKS: &str = "checks";

/// Rate series: one sample per request, true when the status is not 200.
pub const ERRORS: &str = "errors";

pub const LATENCY_LIST_SHOWS: &str = "latency_list_shows";
pub const LATENCY_SINGLE_SHOW: &str = "latency_single_show";
pub const LATENCY_SEARCH: &str = "latency_search";
pub const LATENCY_FILTER: &str = "latency_filter";
pub const LATENCY_TOP_DIRECTORS: &str = "latency_top_directors";
pub const LATENCY_TOP_GENRES: &str = "latency_top_genres";
pub const LATENCY_STATS_CATEGORIES: &str = "latency_stats_categories";
pub const LATENCY_STATS_YEARLY: &str = "latency_stats_yearly";

/// Per-destination latency trends, in iteration order.
pub const LATENCY_TRENDS: [&str; 8] = [
    LATENCY_LIST_SHOWS,
    LATENCY_SINGLE_SHOW,
    LATENCY_SEARCH,
    LATENCY_FILTER,
    LATENCY_TOP_DIRECTORS,
    LATENCY_TOP_GENRES,
    LATENCY_STATS_CATEGORIES,
    LATENCY_STATS_YEARLY,
];

/// Percentiles every trend reports, on top of the ones thresholds ask for.
pub const DEFAULT_PERCENTILES: [f64; 4] = [50.0, 90.0, 95.0, 99.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueContains {
    Default,
    Time,
    Data,
}

const BUILTIN_METRICS: [(&str, MetricKind, ValueContains); 7] = [
    (HTTP_REQS, MetricKind::Counter, ValueContains::Default),
    (HTTP_REQ_DURATION, MetricKind::Trend, ValueContains::Time),
    (HTTP_REQ_FAILED, MetricKind::Rate, ValueContains::Default),
    (ITERATIONS, MetricKind::Counter, ValueContains::Default),
    (ITERATION_DURATION, MetricKind::Trend, ValueContains::Time),
    (DATA_RECEIVED, MetricKind::Counter, ValueContains::Data),
    (CHECKS, MetricKind::Rate, ValueContains::Default),
];

/// Every metric a run registers, keyed by name.
pub fn metric_catalog() -> BTreeMap<&'static str, (MetricKind, ValueContains)> {
    let mut catalog: BTreeMap<_, _> = BUILTIN_METRICS
        .iter()
        .map(|(name, kind, contains)| (*name, (*kind, *contains)))
        .collect();
    catalog.insert(ERRORS, (MetricKind::Rate, ValueContains::Default));
    for name in LATENCY_TRENDS {
        catalog.insert(name, (MetricKind::Trend, ValueContains::Time));
    }
    catalog
}

#[derive(Debug, Default, Clone, Copy)]
struct RateCounts {
    trues: u64,
    total: u64,
}

#[derive(Debug, Clone)]
struct CheckCounts {
    name: String,
    passes: u64,
    fails: u64,
}

/// Run-wide metric accumulators shared by every virtual user.
///
/// Each kind of series sits behind its own lock, so concurrent appends from
/// any number of tasks are serialized and never lost.
#[derive(Debug)]
pub struct Metrics {
    kinds: BTreeMap<String, (MetricKind, ValueContains)>,
    trends: Mutex<BTreeMap<String, Vec<f64>>>,
    rates: Mutex<BTreeMap<String, RateCounts>>,
    counters: Mutex<BTreeMap<String, u64>>,
    checks: Mutex<Vec<CheckCounts>>,
    status_counts: Mutex<BTreeMap<String, u64>>,
    vus_max: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let kinds: BTreeMap<String, (MetricKind, ValueContains)> = metric_catalog()
            .into_iter()
            .map(|(name, kind)| (name.to_string(), kind))
            .collect();

        let mut trends = BTreeMap::new();
        let mut rates = BTreeMap::new();
        let mut counters = BTreeMap::new();
        for (name, (kind, _)) in &kinds {
            match kind {
                MetricKind::Trend => {
                    trends.insert(name.clone(), Vec::new());
                }
                MetricKind::Rate => {
                    rates.insert(name.clone(), RateCounts::default());
                }
                MetricKind::Counter => {
                    counters.insert(name.clone(), 0);
                }
            }
        }

        Self {
            kinds,
            trends: Mutex::new(trends),
            rates: Mutex::new(rates),
            counters: Mutex::new(counters),
            checks: Mutex::new(Vec::new()),
            status_counts: Mutex::new(BTreeMap::new()),
            vus_max: AtomicU64::new(0),
        }
    }

    pub fn add_trend(&self, name: &str, value: f64) {
        self.trends
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    pub fn add_rate(&self, name: &str, value: bool) {
        let mut rates = self.rates.lock();
        let counts = rates.entry(name.to_string()).or_default();
        counts.total += 1;
        if value {
            counts.trues += 1;
        }
    }

    pub fn add_counter(&self, name: &str, delta: u64) {
        *self.counters.lock().entry(name.to_string()).or_insert(0) += delta;
    }

    /// Records one inline assertion. Checks feed their own tallies and the
    /// `checks` rate; they never touch the `errors` series.
    pub fn add_check(&self, name: &str, passed: bool) {
        {
            let mut checks = self.checks.lock();
            let idx = match checks.iter().position(|c| c.name == name) {
                Some(idx) => idx,
                None => {
                    checks.push(CheckCounts {
                        name: name.to_string(),
                        passes: 0,
                        fails: 0,
                    });
                    checks.len() - 1
                }
            };
            if passed {
                checks[idx].passes += 1;
            } else {
                checks[idx].fails += 1;
            }
        }
        self.add_rate(CHECKS, passed);
    }

    pub fn add_status(&self, key: &str) {
        *self.status_counts.lock().entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn observe_vus(&self, active: u64) {
        self.vus_max.fetch_max(active, Ordering::Relaxed);
    }

    pub fn trend_len(&self, name: &str) -> usize {
        self.trends.lock().get(name).map(Vec::len).unwrap_or(0)
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    /// `(trues, total)` of a rate series.
    pub fn rate_counts(&self, name: &str) -> (u64, u64) {
        self.rates
            .lock()
            .get(name)
            .map(|c| (c.trues, c.total))
            .unwrap_or((0, 0))
    }

    /// Freezes the accumulators into the read-only summary model.
    ///
    /// `percentiles` adds to [`DEFAULT_PERCENTILES`] so that thresholds on
    /// uncommon percentiles can be looked up afterwards.
    pub fn summarize(&self, elapsed: Duration, host: HostInfo, percentiles: &[f64]) -> Summary {
        let secs = elapsed.as_secs_f64();
        let mut wanted: Vec<f64> = DEFAULT_PERCENTILES.to_vec();
        for p in percentiles {
            if !wanted.contains(p) {
                wanted.push(*p);
            }
        }

        let mut metrics = BTreeMap::new();

        for (name, samples) in self.trends.lock().iter() {
            let (_, contains) = self.kind_of(name, MetricKind::Trend);
            metrics.insert(
                name.clone(),
                MetricSummary::new(MetricKind::Trend, contains, trend_values(samples, &wanted)),
            );
        }

        for (name, counts) in self.rates.lock().iter() {
            let mut values = BTreeMap::new();
            values.insert("passes".to_string(), counts.trues as f64);
            values.insert("fails".to_string(), (counts.total - counts.trues) as f64);
            if counts.total > 0 {
                values.insert("rate".to_string(), counts.trues as f64 / counts.total as f64);
            }
            let (_, contains) = self.kind_of(name, MetricKind::Rate);
            metrics.insert(name.clone(), MetricSummary::new(MetricKind::Rate, contains, values));
        }

        for (name, count) in self.counters.lock().iter() {
            let mut values = BTreeMap::new();
            values.insert("count".to_string(), *count as f64);
            if secs > 0.0 {
                values.insert("rate".to_string(), *count as f64 / secs);
            }
            let (_, contains) = self.kind_of(name, MetricKind::Counter);
            metrics.insert(name.clone(), MetricSummary::new(MetricKind::Counter, contains, values));
        }

        let checks = self
            .checks
            .lock()
            .iter()
            .map(|c| CheckSummary {
                name: c.name.clone(),
                passes: c.passes,
                fails: c.fails,
            })
            .collect();

        Summary {
            root_group: Group {
                name: String::new(),
                checks,
            },
            state: RunState {
                test_run_duration_ms: secs * 1000.0,
                timestamp: chrono::Local::now().format("%Y/%m/%d %H:%M:%S").to_string(),
                vus_max: self.vus_max.load(Ordering::Relaxed),
                host,
                status_counts: self.status_counts.lock().clone(),
            },
            metrics,
        }
    }

    fn kind_of(&self, name: &str, fallback: MetricKind) -> (MetricKind, ValueContains) {
        self.kinds
            .get(name)
            .copied()
            .unwrap_or((fallback, ValueContains::Default))
    }
}

/// Linear interpolation between closest ranks over an ascending slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

pub fn percentile_key(p: f64) -> String {
    format!("p({})", p)
}

fn trend_values(samples: &[f64], percentiles: &[f64]) -> BTreeMap<String, f64> {
    let mut values = BTreeMap::new();
    if samples.is_empty() {
        return values;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let len = sorted.len();

    values.insert("avg".to_string(), sorted.iter().sum::<f64>() / len as f64);
    values.insert("min".to_string(), sorted[0]);
    values.insert("max".to_string(), sorted[len - 1]);
    if let Some(med) = percentile(&sorted, 50.0) {
        values.insert("med".to_string(), med);
    }
    for p in percentiles {
        if let Some(v) = percentile(&sorted, *p) {
            values.insert(percentile_key(*p), v);
        }
    }
    values
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub root_group: Group,
    pub state: RunState,
    pub metrics: BTreeMap<String, MetricSummary>,
}

impl Summary {
    /// Looks up one aggregate statistic, `None` when it is not available.
    pub fn stat(&self, metric: &str, key: &str) -> Option<f64> {
        self.metrics.get(metric)?.values.get(key).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub checks: Vec<CheckSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    pub test_run_duration_ms: f64,
    pub timestamp: String,
    pub vus_max: u64,
    pub host: HostInfo,
    pub status_counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub contains: ValueContains,
    pub values: BTreeMap<String, f64>,
    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdResult>,
}

impl MetricSummary {
    fn new(kind: MetricKind, contains: ValueContains, values: BTreeMap<String, f64>) -> Self {
        Self {
            kind,
            contains,
            values,
            thresholds: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub ok: bool,
}
