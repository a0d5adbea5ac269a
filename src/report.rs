use std::fmt::Write;

use crate::{
    compare::{BaselineComparison, RegressionVerdict, VerdictStatus},
    record::ScenarioKey,
    runner::{ScenarioState, SweepReport},
};

fn status_label(status: VerdictStatus) -> &'static str {
    match status {
        VerdictStatus::Pass => "PASS",
        VerdictStatus::Fail => "FAIL",
    }
}

pub fn render_verdicts(key: &ScenarioKey, verdicts: &[RegressionVerdict]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{key}");
    let _ = writeln!(
        out,
        "  {:<26}{:>12}{:>12}{:>10}{:>11}  {}",
        "metric", "baseline", "current", "delta", "threshold", "status"
    );
    for v in verdicts {
        let _ = writeln!(
            out,
            "  {:<26}{:>12.3}{:>12.3}{:>9.2}%{:>10.2}%  {}",
            v.metric.name(),
            v.baseline_value,
            v.current_value,
            v.delta_pct,
            v.threshold_pct,
            status_label(v.status)
        );
    }
    out
}

pub fn render_sweep(report: &SweepReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "component={} baseline={} scenarios={}",
        report.component,
        report.baseline_name,
        report.scenarios.len()
    );
    for run in &report.scenarios {
        match &run.state {
            ScenarioState::Compared { record, verdicts } if !verdicts.is_empty() => {
                let _ = writeln!(out, "{}", record.summary());
                out.push_str(&render_verdicts(&run.key, verdicts));
            }
            ScenarioState::Compared { record, .. } => {
                let _ = writeln!(out, "{} [no baseline entry]", record.summary());
            }
            ScenarioState::Baselined(record) => {
                let _ = writeln!(out, "{} [baselined]", record.summary());
            }
            ScenarioState::Failed(err) => {
                let _ = writeln!(out, "{}: FAILED {err}", run.key);
            }
            other => {
                let _ = writeln!(out, "{}: {}", run.key, other.name());
            }
        }
    }
    for warning in &report.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }
    if report.cancelled {
        out.push_str("sweep cancelled\n");
    }
    let _ = writeln!(out, "result: {}", if report.passed() { "PASS" } else { "FAIL" });
    out
}

pub fn render_comparison(comparison: &BaselineComparison) -> String {
    let mut out = String::new();
    for (key, verdicts) in &comparison.compared {
        out.push_str(&render_verdicts(key, verdicts));
    }
    for key in &comparison.missing {
        let _ = writeln!(out, "{key}: not in baseline, skipped");
    }
    for key in &comparison.dropped {
        let _ = writeln!(out, "{key}: in baseline but missing from current results, FAIL");
    }
    let _ = writeln!(
        out,
        "result: {}",
        if comparison.passed() { "PASS" } else { "FAIL" }
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::TrackedMetric;
    use crate::record::LengthBucket;

    #[test]
    fn test_verdict_table_lists_status() {
        let key = ScenarioKey::new("embedding", 64, LengthBucket::Short);
        let verdicts = vec![RegressionVerdict {
            metric: TrackedMetric::AvgLatency,
            baseline_value: 6.66,
            current_value: 7.40,
            delta_pct: 11.11,
            threshold_pct: 10.0,
            status: VerdictStatus::Fail,
        }];
        let table = render_verdicts(&key, &verdicts);
        assert!(table.starts_with("embedding/batch=64/len=short"));
        assert!(table.contains("avg_latency_ms"));
        assert!(table.contains("FAIL"));
    }

    #[test]
    fn test_comparison_lists_dropped_scenarios() {
        let comparison = BaselineComparison {
            compared: Vec::new(),
            missing: Vec::new(),
            dropped: vec![ScenarioKey::new("nli", 8, LengthBucket::Long)],
        };
        let text = render_comparison(&comparison);
        assert!(text.contains("nli/batch=8/len=long: in baseline but missing"));
        assert!(text.ends_with("result: FAIL\n"));
    }
}
