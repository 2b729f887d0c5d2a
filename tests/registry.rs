//! Metrics registry invariants: lossless merge, tag coverage, and the
//! percentile interpolation reference vector.

use stampede::engine::registry::{Registry, RegistrySnapshot};
use stampede::engine::report::{Report, REPORT_PERCENTILES, build_report};

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn percentile_interpolation_reference_vector() {
    let registry = Registry::new();
    let trend = registry.trend("latency");
    for value in 100..=200 {
        trend.add(value as f64, &[]);
    }

    let report = build_report(&registry.snapshot(), &[50, 90, 99]);
    let summary = &report.trends["latency"]["_"];

    assert_close(summary.min, 100.0);
    assert_close(summary.max, 200.0);
    assert_close(summary.avg, 150.0);
    assert_eq!(summary.total, 101);
    assert_close(summary.percentiles[&50], 150.0);
    assert_close(summary.percentiles[&90], 190.0);
    assert_close(summary.percentiles[&99], 199.0);
}

#[test]
fn tag_coverage_is_exactly_once_per_tag() {
    let registry = Registry::new();
    let trend = registry.trend("fetch");
    trend.add(1.5, &["OK"]);
    trend.add(2.5, &["OK", "slow"]);
    trend.add(3.5, &[]);

    let snapshot = registry.snapshot();
    let tags = &snapshot.trends["fetch"];

    assert_eq!(tags["_"], vec![1.5, 2.5, 3.5]);
    assert_eq!(tags["OK"], vec![1.5, 2.5]);
    assert_eq!(tags["slow"], vec![2.5]);
    assert_eq!(tags.len(), 3, "no other tag sequences exist");

    let occurrences = |tag: &str, value: f64| tags[tag].iter().filter(|&&v| v == value).count();
    assert_eq!(occurrences("_", 2.5), 1);
    assert_eq!(occurrences("OK", 2.5), 1);
    assert_eq!(occurrences("slow", 2.5), 1);
}

#[test]
fn trend_handles_are_idempotent_per_name() {
    let registry = Registry::new();
    registry.trend("iterations").add(1.0, &["success"]);
    registry.trend("iterations").add(2.0, &["success"]);

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.trends["iterations"]["_"], vec![1.0, 2.0]);
    assert_eq!(snapshot.trends["iterations"]["success"], vec![1.0, 2.0]);
}

#[test]
fn counters_sum_across_tags_and_merges() {
    let a = Registry::new();
    a.counter("iterations").add(3.0, &["success"]);
    a.counter("iterations").add(1.0, &["fail"]);

    let b = Registry::new();
    b.counter("iterations").add(2.0, &["success"]);

    let merged = RegistrySnapshot::merge([a.snapshot(), b.snapshot()]);
    let counter = &merged.counters["iterations"];
    assert_eq!(counter["_"], 6.0);
    assert_eq!(counter["success"], 5.0);
    assert_eq!(counter["fail"], 1.0);
}

#[test]
fn merged_partitions_report_like_one_registry() {
    // The same observations, once in a single registry and once partitioned
    // across three "per-VU" registries merged in a different order.
    let observations: Vec<(f64, &str)> = (0..60)
        .map(|i| {
            (
                (i * 7 % 23) as f64 + 0.25,
                if i % 3 == 0 { "OK" } else { "fail" },
            )
        })
        .collect();

    let whole = Registry::new();
    for (value, tag) in &observations {
        whole.trend("fetch").add(*value, &[tag]);
        whole.counter("iterations").add(1.0, &[tag]);
    }

    let parts: Vec<Registry> = (0..3).map(|_| Registry::new()).collect();
    for (i, (value, tag)) in observations.iter().enumerate() {
        parts[i % 3].trend("fetch").add(*value, &[tag]);
        parts[i % 3].counter("iterations").add(1.0, &[tag]);
    }

    let merged = RegistrySnapshot::merge([
        parts[2].snapshot(),
        parts[0].snapshot(),
        parts[1].snapshot(),
    ]);

    let report_whole = build_report(&whole.snapshot(), &REPORT_PERCENTILES);
    let report_merged = build_report(&merged, &REPORT_PERCENTILES);

    assert_reports_equivalent(&report_whole, &report_merged);
}

fn assert_reports_equivalent(a: &Report, b: &Report) {
    assert_eq!(
        a.trends.keys().collect::<Vec<_>>(),
        b.trends.keys().collect::<Vec<_>>()
    );
    for (name, tags_a) in &a.trends {
        let tags_b = &b.trends[name];
        assert_eq!(
            tags_a.keys().collect::<Vec<_>>(),
            tags_b.keys().collect::<Vec<_>>(),
            "tag sets differ for trend {name}"
        );
        for (tag, summary_a) in tags_a {
            let summary_b = &tags_b[tag];
            assert_eq!(summary_a.min, summary_b.min, "{name}/{tag} min");
            assert_eq!(summary_a.max, summary_b.max, "{name}/{tag} max");
            assert_eq!(summary_a.total, summary_b.total, "{name}/{tag} total");
            assert_close(summary_a.avg, summary_b.avg);
            for (p, value_a) in &summary_a.percentiles {
                assert_eq!(value_a, &summary_b.percentiles[p], "{name}/{tag} p{p}");
            }
        }
    }
    assert_eq!(a.counters, b.counters);
}

#[test]
fn unobserved_trend_reports_zeros() {
    let registry = Registry::new();
    let _ = registry.trend("latency");

    let report = build_report(&registry.snapshot(), &REPORT_PERCENTILES);
    let summary = &report.trends["latency"]["_"];
    assert_eq!(summary.min, 0.0);
    assert_eq!(summary.max, 0.0);
    assert_eq!(summary.avg, 0.0);
    assert_eq!(summary.total, 0);
    assert!(summary.percentiles.values().all(|&v| v == 0.0));
}
