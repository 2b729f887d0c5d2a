use crate::engine::registry::DEFAULT_TAG;
use crate::engine::report::{Report, TrendSummary};
use crate::types::ThresholdFn;
use serde::Deserialize;
use std::sync::Arc;

fn default_tag() -> String {
    DEFAULT_TAG.to_string()
}

/// One declarative threshold from the script's `[[thresholds]]` array.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdRule {
    /// Trend or counter name (trends shadow counters of the same name).
    pub metric: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    pub stat: Stat,
    pub op: Op,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stat {
    Min,
    Max,
    Avg,
    P50,
    P90,
    P95,
    P99,
    Count,
}

impl Stat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stat::Min => "min",
            Stat::Max => "max",
            Stat::Avg => "avg",
            Stat::P50 => "p50",
            Stat::P90 => "p90",
            Stat::P95 => "p95",
            Stat::P99 => "p99",
            Stat::Count => "count",
        }
    }

    fn of(self, summary: &TrendSummary) -> f64 {
        match self {
            Stat::Min => summary.min,
            Stat::Max => summary.max,
            Stat::Avg => summary.avg,
            Stat::P50 => summary.percentiles.get(&50).copied().unwrap_or(0.0),
            Stat::P90 => summary.percentiles.get(&90).copied().unwrap_or(0.0),
            Stat::P95 => summary.percentiles.get(&95).copied().unwrap_or(0.0),
            Stat::P99 => summary.percentiles.get(&99).copied().unwrap_or(0.0),
            Stat::Count => summary.total as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Op {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Eq => "==",
        }
    }

    pub fn evaluate(&self, actual: f64, expected: f64) -> bool {
        match self {
            Op::Lt => actual < expected,
            Op::Le => actual <= expected,
            Op::Gt => actual > expected,
            Op::Ge => actual >= expected,
            Op::Eq => actual == expected,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThresholdResult {
    pub condition: String,
    pub actual: f64,
    pub passed: bool,
}

pub fn evaluate_rules(rules: &[ThresholdRule], report: &Report) -> Vec<ThresholdResult> {
    rules.iter().map(|rule| evaluate_rule(rule, report)).collect()
}

fn evaluate_rule(rule: &ThresholdRule, report: &Report) -> ThresholdResult {
    let actual = metric_value(rule, report);
    ThresholdResult {
        condition: format!(
            "{}{{{}}}.{} {} {}",
            rule.metric,
            rule.tag,
            rule.stat.as_str(),
            rule.op.as_str(),
            rule.value
        ),
        actual,
        passed: rule.op.evaluate(actual, rule.value),
    }
}

/// Absent metrics and tags read as zero, so rules can assert absence
/// (e.g. `iterations{fail}.count == 0`).
fn metric_value(rule: &ThresholdRule, report: &Report) -> f64 {
    if let Some(summary) = report
        .trends
        .get(&rule.metric)
        .and_then(|tags| tags.get(&rule.tag))
    {
        return rule.stat.of(summary);
    }
    report
        .counters
        .get(&rule.metric)
        .and_then(|tags| tags.get(&rule.tag))
        .copied()
        .unwrap_or(0.0)
}

/// Compile the rules into the opaque threshold hook the runner calls: all
/// rules are evaluated, and any failure reports every failing condition.
pub fn compile(rules: Vec<ThresholdRule>) -> ThresholdFn {
    Arc::new(move |report| {
        let failures: Vec<String> = evaluate_rules(&rules, report)
            .into_iter()
            .filter(|result| !result.passed)
            .map(|result| format!("{} (actual: {:.4})", result.condition, result.actual))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures.join("; "))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::registry::Registry;
    use crate::engine::report::{REPORT_PERCENTILES, build_report};

    fn sample_report() -> Report {
        let registry = Registry::new();
        let trend = registry.trend("iterations");
        for value in [10.0, 20.0, 30.0] {
            trend.add(value, &["success"]);
        }
        build_report(&registry.snapshot(), &REPORT_PERCENTILES)
    }

    #[test]
    fn operators_evaluate() {
        assert!(Op::Lt.evaluate(1.0, 2.0));
        assert!(Op::Ge.evaluate(2.0, 2.0));
        assert!(!Op::Eq.evaluate(1.0, 2.0));
    }

    #[test]
    fn absent_tag_reads_zero() {
        let rules = vec![ThresholdRule {
            metric: "iterations".to_string(),
            tag: "fail".to_string(),
            stat: Stat::Count,
            op: Op::Eq,
            value: 0.0,
        }];
        let results = evaluate_rules(&rules, &sample_report());
        assert!(results[0].passed);
        assert_eq!(results[0].actual, 0.0);
    }

    #[test]
    fn compiled_rules_report_failures() {
        let check = compile(vec![ThresholdRule {
            metric: "iterations".to_string(),
            tag: "success".to_string(),
            stat: Stat::Count,
            op: Op::Eq,
            value: 0.0,
        }]);
        let message = check(&sample_report()).unwrap_err();
        assert!(message.contains("iterations{success}.count == 0"));
        assert!(message.contains("actual: 3"));
    }
}
