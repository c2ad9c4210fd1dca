use colored::*;
use std::path::Path;

use crate::error::Result;
use crate::executor::vu::Endpoint;
use crate::models::metrics::{Summary, CHECKS, ERRORS, HTTP_REQS, ITERATIONS};

const BOX_WIDTH: usize = 51;

pub fn print_summary(summary: &Summary) {
    println!("{}", render_summary(summary));
    println!("{}", render_details(summary));
    println!("{}", render_thresholds(summary));
    println!("{}", render_status_breakdown(summary));
}

/// Writes the full summary as pretty JSON.
pub fn write_results(path: &Path, summary: &Summary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn fixed(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None => "N/A".to_string(),
    }
}

fn boxed(line: String) -> String {
    format!("{:<width$}║", line, width = BOX_WIDTH)
}

/// The latency table. Depends only on `summary`, so rendering the same
/// summary twice yields the same bytes.
pub fn render_summary(summary: &Summary) -> String {
    let mut lines = vec![
        "\n╔══════════════════════════════════════════════════╗".to_string(),
        "║         NETFLIX API — BASELINE LOAD TEST         ║".to_string(),
        "╠══════════════════════════════════════════════════╣".to_string(),
    ];

    for endpoint in Endpoint::ALL {
        let key = endpoint.metric_name();
        if !summary.metrics.contains_key(key) {
            continue;
        }
        let p50 = fixed(summary.stat(key, "p(50)"), 1);
        let p95 = fixed(summary.stat(key, "p(95)"), 1);
        let p99 = fixed(summary.stat(key, "p(99)"), 1);
        lines.push(format!(
            "║ {:<18} p50: {:>7}ms  p95: {:>7}ms  p99: {:>7}ms ║",
            endpoint.label(),
            p50,
            p95,
            p99
        ));
    }

    let count = summary
        .stat(HTTP_REQS, "count")
        .map(|c| format!("{}", c as u64))
        .unwrap_or_else(|| "N/A".to_string());
    let error_rate = summary.stat(ERRORS, "rate").unwrap_or(0.0) * 100.0;

    lines.push("╠══════════════════════════════════════════════════╣".to_string());
    lines.push(boxed(format!("║ Total requests:  {}", count)));
    lines.push(boxed(format!(
        "║ Throughput:      {} req/s",
        fixed(summary.stat(HTTP_REQS, "rate"), 1)
    )));
    lines.push(boxed(format!("║ Error rate:      {:.2}%", error_rate)));
    lines.push("╚══════════════════════════════════════════════════╝\n".to_string());

    lines.join("\n")
}

pub fn render_details(summary: &Summary) -> String {
    let state = &summary.state;
    let mut lines = vec![
        format!("{}", "🔥 ======== TEST RESULTS ======== 🔥".bold().white().on_blue()),
        format!("{} {}", "⏰ Timestamp          :".blue().bold(), state.timestamp.bold()),
        format!(
            "{} {}",
            "⌛ Duration (s)       :".blue().bold(),
            format!("{:.1}", state.test_run_duration_ms / 1000.0).bold()
        ),
        format!("{} {}", "👥 Max VUs            :".blue().bold(), state.vus_max.to_string().bold()),
        format!(
            "{} {}",
            "🔁 Iterations         :".blue().bold(),
            fixed(summary.stat(ITERATIONS, "count"), 0).bold()
        ),
        format!(
            "{} {}",
            "🖥  Host               :".blue().bold(),
            format!(
                "{} cores, {} MiB free of {} MiB",
                state.host.cpu_cores,
                state.host.available_memory / (1024 * 1024),
                state.host.total_memory / (1024 * 1024)
            )
            .bold()
        ),
    ];

    let checks_rate = fixed(summary.stat(CHECKS, "rate").map(|r| r * 100.0), 2);
    lines.push(format!("{} {}", "✅ Checks passed (%)  :".green().bold(), checks_rate.bold()));
    for check in &summary.root_group.checks {
        let mark = if check.fails == 0 { "✓".green() } else { "✗".red() };
        lines.push(format!(
            "   {} {} ({} passed, {} failed)",
            mark, check.name, check.passes, check.fails
        ));
    }

    lines.join("\n")
}

pub fn render_thresholds(summary: &Summary) -> String {
    let mut lines = vec![format!("{}", "🎯 ======== THRESHOLDS ========".bold().white().on_blue())];
    for (name, metric) in &summary.metrics {
        for (expression, result) in &metric.thresholds {
            let mark = if result.ok { "✓".green().bold() } else { "✗".red().bold() };
            lines.push(format!("{} {}: {}", mark, name, expression));
        }
    }
    lines.join("\n")
}

pub fn render_status_breakdown(summary: &Summary) -> String {
    let mut lines = vec![format!("{}", "📦 ======== STATUS BREAKDOWN ========".bold().white().on_blue())];
    for (status, count) in &summary.state.status_counts {
        let line = format!("• {}: {}", status, count);
        if status == "200" {
            lines.push(line.bold().to_string());
        } else {
            lines.push(line.red().bold().to_string());
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::instrument::record_outcome;
    use crate::client::RequestOutcome;
    use crate::models::metrics::Metrics;
    use crate::models::threshold::{evaluate_thresholds, Threshold};
    use crate::utils::hardware::HostInfo;
    use std::time::Duration;

    fn host() -> HostInfo {
        HostInfo {
            cpu_cores: 4,
            total_memory: 8 << 30,
            available_memory: 4 << 30,
        }
    }

    fn sample_summary() -> Summary {
        let metrics = Metrics::new();
        for (i, status) in [200u16, 200, 500, 200].iter().enumerate() {
            let outcome = RequestOutcome {
                url: "http://127.0.0.1:8000/netflix/shows".to_string(),
                status: *status,
                body_len: 10,
                duration: Duration::from_millis(10 * (i as u64 + 1)),
                failure: None,
            };
            record_outcome(&metrics, Endpoint::ListShows.metric_name(), &outcome);
        }
        let mut summary = metrics.summarize(Duration::from_secs(2), host(), &[]);
        let thresholds = vec![Threshold::parse(ERRORS, "rate<0.1").unwrap()];
        evaluate_thresholds(&thresholds, &mut summary);
        summary
    }

    #[test]
    fn empty_series_render_not_available() {
        let summary = Metrics::new().summarize(Duration::from_secs(1), host(), &[]);
        let text = render_summary(&summary);

        let search = text
            .lines()
            .find(|l| l.contains("Search"))
            .unwrap();
        assert_eq!(search.matches("N/A").count(), 3);
        assert!(text.contains("Total requests:  0"));
        assert!(text.contains("Error rate:      0.00%"));
    }

    #[test]
    fn summary_lists_percentiles_and_totals() {
        let text = render_summary(&sample_summary());

        let list = text.lines().find(|l| l.contains("List shows")).unwrap();
        assert!(list.contains("p50:    25.0ms"), "{}", list);
        assert!(text.contains("Total requests:  4"));
        assert!(text.contains("Throughput:      2.0 req/s"));
        assert!(text.contains("Error rate:      25.00%"));

        let single = text.lines().find(|l| l.contains("Single show")).unwrap();
        assert!(single.contains("N/A"));
    }

    #[test]
    fn rendering_is_idempotent() {
        let summary = sample_summary();
        assert_eq!(render_summary(&summary), render_summary(&summary));
        assert_eq!(render_thresholds(&summary), render_thresholds(&summary));
    }

    #[test]
    fn results_file_round_trips() {
        let summary = sample_summary();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline_results.json");

        write_results(&path, &summary).unwrap();
        let parsed: Summary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(parsed.stat(HTTP_REQS, "count"), Some(4.0));
        assert_eq!(parsed.stat(ERRORS, "rate"), Some(0.25));
        assert!(!parsed.metrics[ERRORS].thresholds["rate<0.1"].ok);
        assert_eq!(render_summary(&parsed), render_summary(&summary));
    }

    #[test]
    fn thresholds_and_statuses_are_listed() {
        colored::control::set_override(false);
        let summary = sample_summary();

        let thresholds = render_thresholds(&summary);
        assert!(thresholds.contains("✗ errors: rate<0.1"));

        let statuses = render_status_breakdown(&summary);
        assert!(statuses.contains("• 200: 3"));
        assert!(statuses.contains("• 500: 1"));
    }
}
