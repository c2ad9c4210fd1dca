use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::client::{send_get, HttpsClient, RequestOutcome};
use crate::models::metrics::{
    Metrics, DATA_RECEIVED, ERRORS, HTTP_REQS, HTTP_REQ_DURATION, HTTP_REQ_FAILED,
};

pub const CHECK_STATUS_200: &str = "status is 200";
pub const CHECK_HAS_BODY: &str = "has body";

/// Issues one GET and records it against `trend` and the run-wide series.
pub async fn make_request(
    client: &HttpsClient,
    metrics: &Metrics,
    url: &Url,
    trend: &str,
    headers: Option<&HashMap<String, String>>,
    max_duration: Duration,
) -> RequestOutcome {
    let outcome = send_get(client, url, headers, max_duration).await;
    record_outcome(metrics, trend, &outcome);
    outcome
}

pub fn record_outcome(metrics: &Metrics, trend: &str, outcome: &RequestOutcome) {
    let elapsed = outcome.duration.as_secs_f64() * 1000.0;

    metrics.add_trend(trend, elapsed);
    metrics.add_trend(HTTP_REQ_DURATION, elapsed);
    metrics.add_counter(HTTP_REQS, 1);
    metrics.add_counter(DATA_RECEIVED, outcome.body_len as u64);

    metrics.add_rate(ERRORS, outcome.status != 200);
    metrics.add_rate(
        HTTP_REQ_FAILED,
        outcome.failure.is_some() || outcome.status >= 400,
    );

    metrics.add_check(CHECK_STATUS_200, outcome.status == 200);
    metrics.add_check(CHECK_HAS_BODY, outcome.body_len > 0);

    metrics.add_status(&outcome.status_key());

    match &outcome.failure {
        None => tracing::debug!(
            url = %outcome.url,
            status = outcome.status,
            duration_ms = elapsed,
            "request"
        ),
        Some((failure, reason)) => tracing::debug!(
            url = %outcome.url,
            failure = failure.as_str(),
            reason = %reason,
            duration_ms = elapsed,
            "request failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Failure;
    use crate::models::metrics::CHECKS;

    fn outcome(status: u16, body_len: usize) -> RequestOutcome {
        RequestOutcome {
            url: "http://127.0.0.1:8000/netflix/shows".to_string(),
            status,
            body_len,
            duration: Duration::from_millis(12),
            failure: None,
        }
    }

    #[test]
    fn one_error_sample_per_request() {
        let metrics = Metrics::new();
        record_outcome(&metrics, "latency_list_shows", &outcome(200, 10));
        record_outcome(&metrics, "latency_list_shows", &outcome(404, 10));
        record_outcome(&metrics, "latency_search", &outcome(204, 0));

        assert_eq!(metrics.rate_counts(ERRORS), (2, 3));
        assert_eq!(metrics.rate_counts(HTTP_REQ_FAILED), (1, 3));
        assert_eq!(metrics.counter(HTTP_REQS), 3);
        assert_eq!(metrics.counter(DATA_RECEIVED), 20);
        assert_eq!(metrics.trend_len("latency_list_shows"), 2);
        assert_eq!(metrics.trend_len("latency_search"), 1);
        assert_eq!(metrics.trend_len(HTTP_REQ_DURATION), 3);
    }

    #[test]
    fn checks_are_observational() {
        let metrics = Metrics::new();
        record_outcome(&metrics, "latency_filter", &outcome(200, 0));

        // one passing status check, one failing body check
        assert_eq!(metrics.rate_counts(CHECKS), (1, 2));
        assert_eq!(metrics.rate_counts(ERRORS), (0, 1));
    }

    #[test]
    fn transport_failure_counts_as_error() {
        let metrics = Metrics::new();
        let failed = RequestOutcome {
            status: 0,
            body_len: 0,
            failure: Some((Failure::RequestError, "Connection refused".to_string())),
            ..outcome(0, 0)
        };
        record_outcome(&metrics, "latency_single_show", &failed);

        assert_eq!(metrics.rate_counts(ERRORS), (1, 1));
        assert_eq!(metrics.rate_counts(HTTP_REQ_FAILED), (1, 1));
        assert_eq!(failed.status_key(), "REQUEST_ERROR");
    }
}
