use std::collections::BTreeMap;

use crate::error::{LoadTestError, Result};
use crate::models::metrics::{metric_catalog, percentile_key, MetricKind, Summary, ThresholdResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Statistic {
    Avg,
    Min,
    Med,
    Max,
    Percentile(f64),
    Rate,
    Count,
}

impl Statistic {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "avg" => Some(Self::Avg),
            "min" => Some(Self::Min),
            "med" => Some(Self::Med),
            "max" => Some(Self::Max),
            "rate" => Some(Self::Rate),
            "count" => Some(Self::Count),
            _ => {
                let inner = s.strip_prefix("p(")?.strip_suffix(')')?;
                let p: f64 = inner.trim().parse().ok()?;
                (0.0..=100.0).contains(&p).then_some(Self::Percentile(p))
            }
        }
    }

    /// Key of this statistic in a summarized metric's values.
    pub fn key(&self) -> String {
        match self {
            Self::Avg => "avg".to_string(),
            Self::Min => "min".to_string(),
            Self::Med => "med".to_string(),
            Self::Max => "max".to_string(),
            Self::Percentile(p) => percentile_key(*p),
            Self::Rate => "rate".to_string(),
            Self::Count => "count".to_string(),
        }
    }

    fn supported_by(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Trend => matches!(
                self,
                Self::Avg | Self::Min | Self::Med | Self::Max | Self::Percentile(_)
            ),
            MetricKind::Rate => matches!(self, Self::Rate),
            MetricKind::Counter => matches!(self, Self::Count | Self::Rate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
        }
    }
}

/// A pass/fail predicate over one aggregate statistic of one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: String,
    /// The expression exactly as configured, used as its key in the summary.
    pub expression: String,
    pub statistic: Statistic,
    pub comparison: Comparison,
    pub bound: f64,
}

impl Threshold {
    pub fn parse(metric: &str, expression: &str) -> Result<Self> {
        let invalid = |reason: &str| LoadTestError::InvalidThreshold {
            metric: metric.to_string(),
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let op_start = expression
            .find(|c: char| matches!(c, '<' | '>' | '=' | '!'))
            .ok_or_else(|| invalid("missing comparison operator"))?;
        let (lhs, rest) = expression.split_at(op_start);

        let (comparison, rhs) = if let Some(rhs) = rest.strip_prefix("<=") {
            (Comparison::Le, rhs)
        } else if let Some(rhs) = rest.strip_prefix(">=") {
            (Comparison::Ge, rhs)
        } else if let Some(rhs) = rest.strip_prefix("==") {
            (Comparison::Eq, rhs)
        } else if let Some(rhs) = rest.strip_prefix("!=") {
            (Comparison::Ne, rhs)
        } else if let Some(rhs) = rest.strip_prefix('<') {
            (Comparison::Lt, rhs)
        } else if let Some(rhs) = rest.strip_prefix('>') {
            (Comparison::Gt, rhs)
        } else {
            return Err(invalid("unknown comparison operator"));
        };

        let statistic = Statistic::parse(lhs.trim())
            .ok_or_else(|| invalid(&format!("unknown statistic '{}'", lhs.trim())))?;
        let bound: f64 = rhs
            .trim()
            .parse()
            .map_err(|_| invalid(&format!("bound '{}' is not a number", rhs.trim())))?;
        if !bound.is_finite() {
            return Err(invalid("bound must be finite"));
        }

        Ok(Self {
            metric: metric.to_string(),
            expression: expression.to_string(),
            statistic,
            comparison,
            bound,
        })
    }

    /// `None` when the statistic is not available in the summary.
    pub fn evaluate(&self, summary: &Summary) -> Option<bool> {
        let value = summary.stat(&self.metric, &self.statistic.key())?;
        Some(self.comparison.holds(value, self.bound))
    }
}

/// Parses and validates every configured threshold against the metrics a
/// run registers.
pub fn parse_thresholds(config: &BTreeMap<String, Vec<String>>) -> Result<Vec<Threshold>> {
    let catalog = metric_catalog();
    let mut thresholds = Vec::new();

    for (metric, expressions) in config {
        let (kind, _) = catalog.get(metric.as_str()).ok_or_else(|| {
            LoadTestError::InvalidConfig(format!("threshold on unknown metric '{}'", metric))
        })?;
        for expression in expressions {
            let threshold = Threshold::parse(metric, expression)?;
            if !threshold.statistic.supported_by(*kind) {
                return Err(LoadTestError::InvalidThreshold {
                    metric: metric.clone(),
                    expression: expression.clone(),
                    reason: format!(
                        "statistic '{}' does not apply to a {:?} metric",
                        threshold.statistic.key(),
                        kind
                    ),
                });
            }
            thresholds.push(threshold);
        }
    }

    Ok(thresholds)
}

/// Percentiles the thresholds reference, so the summary computes them.
pub fn referenced_percentiles(thresholds: &[Threshold]) -> Vec<f64> {
    thresholds
        .iter()
        .filter_map(|t| match t.statistic {
            Statistic::Percentile(p) => Some(p),
            _ => None,
        })
        .collect()
}

/// Evaluates every threshold, recording each verdict in the summary.
/// Returns whether all of them passed; an unavailable statistic fails.
pub fn evaluate_thresholds(thresholds: &[Threshold], summary: &mut Summary) -> bool {
    let mut all_ok = true;
    for threshold in thresholds {
        let ok = threshold.evaluate(summary).unwrap_or(false);
        if !ok {
            tracing::warn!(
                metric = %threshold.metric,
                expression = %threshold.expression,
                "threshold crossed"
            );
            all_ok = false;
        }
        if let Some(metric) = summary.metrics.get_mut(&threshold.metric) {
            metric
                .thresholds
                .insert(threshold.expression.clone(), ThresholdResult { ok });
        }
    }
    all_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::metrics::{Metrics, ERRORS, HTTP_REQ_DURATION, HTTP_REQS};
    use crate::utils::hardware::HostInfo;
    use std::time::Duration;

    fn summary_with(durations: &[f64], errors: &[bool]) -> Summary {
        let metrics = Metrics::new();
        for d in durations {
            metrics.add_trend(HTTP_REQ_DURATION, *d);
            metrics.add_counter(HTTP_REQS, 1);
        }
        for e in errors {
            metrics.add_rate(ERRORS, *e);
        }
        let host = HostInfo {
            cpu_cores: 1,
            total_memory: 0,
            available_memory: 0,
        };
        metrics.summarize(Duration::from_secs(1), host, &[])
    }

    #[test]
    fn parses_common_expressions() {
        let t = Threshold::parse(HTTP_REQ_DURATION, "p(95)<2000").unwrap();
        assert_eq!(t.statistic, Statistic::Percentile(95.0));
        assert_eq!(t.comparison, Comparison::Lt);
        assert_eq!(t.bound, 2000.0);

        let t = Threshold::parse(ERRORS, "rate < 0.1").unwrap();
        assert_eq!(t.statistic, Statistic::Rate);
        assert_eq!(t.bound, 0.1);

        let t = Threshold::parse(HTTP_REQS, "count>=10").unwrap();
        assert_eq!(t.comparison, Comparison::Ge);

        let t = Threshold::parse(HTTP_REQ_DURATION, "p(99.9) != 5").unwrap();
        assert_eq!(t.statistic, Statistic::Percentile(99.9));
        assert_eq!(t.comparison, Comparison::Ne);
    }

    #[test]
    fn rejects_malformed_expressions() {
        for expr in ["p95<2000", "p(95)", "rate<abc", "p(101)<1", "avg=<3", "<5", "rate<inf"] {
            assert!(
                Threshold::parse(HTTP_REQ_DURATION, expr).is_err(),
                "accepted '{}'",
                expr
            );
        }
    }

    #[test]
    fn validation_checks_metric_and_statistic() {
        let mut config = BTreeMap::new();
        config.insert("errors".to_string(), vec!["p(95)<1".to_string()]);
        assert!(matches!(
            parse_thresholds(&config),
            Err(LoadTestError::InvalidThreshold { .. })
        ));

        let mut config = BTreeMap::new();
        config.insert("no_such_metric".to_string(), vec!["rate<1".to_string()]);
        assert!(matches!(
            parse_thresholds(&config),
            Err(LoadTestError::InvalidConfig(_))
        ));

        let mut config = BTreeMap::new();
        config.insert(HTTP_REQ_DURATION.to_string(), vec!["p(95)<2000".to_string()]);
        config.insert(ERRORS.to_string(), vec!["rate<0.1".to_string()]);
        assert_eq!(parse_thresholds(&config).unwrap().len(), 2);
    }

    #[test]
    fn evaluation_records_verdicts() {
        let mut summary = summary_with(&[100.0, 200.0, 300.0], &[true, true, false]);
        let thresholds = vec![
            Threshold::parse(HTTP_REQ_DURATION, "p(95)<2000").unwrap(),
            Threshold::parse(ERRORS, "rate<0.1").unwrap(),
        ];

        assert!(!evaluate_thresholds(&thresholds, &mut summary));
        assert!(summary.metrics[HTTP_REQ_DURATION].thresholds["p(95)<2000"].ok);
        assert!(!summary.metrics[ERRORS].thresholds["rate<0.1"].ok);
    }

    #[test]
    fn unavailable_statistic_fails() {
        let mut summary = summary_with(&[], &[]);
        let thresholds = vec![Threshold::parse(HTTP_REQ_DURATION, "p(95)<2000").unwrap()];
        assert_eq!(thresholds[0].evaluate(&summary), None);
        assert!(!evaluate_thresholds(&thresholds, &mut summary));
    }
}
