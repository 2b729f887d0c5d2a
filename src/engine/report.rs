use super::registry::RegistrySnapshot;
use serde::Serialize;
use std::collections::BTreeMap;

/// Percentiles reported for every trend tag.
pub const REPORT_PERCENTILES: [u8; 4] = [50, 90, 95, 99];

/// Summary of one trend tag's observation sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendSummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub percentiles: BTreeMap<u8, f64>,
    pub total: u64,
}

/// The final report handed to thresholds and the output layer. Trends are
/// summarised per tag; counters are copied verbatim.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub trends: BTreeMap<String, BTreeMap<String, TrendSummary>>,
    pub counters: BTreeMap<String, BTreeMap<String, f64>>,
}

pub fn build_report(snapshot: &RegistrySnapshot, percentiles: &[u8]) -> Report {
    let mut report = Report {
        counters: snapshot.counters.clone(),
        ..Report::default()
    };
    for (name, tags) in &snapshot.trends {
        let trend = report.trends.entry(name.clone()).or_default();
        for (tag, values) in tags {
            trend.insert(tag.clone(), summarize(values, percentiles));
        }
    }
    report
}

fn summarize(values: &[f64], percentiles: &[u8]) -> TrendSummary {
    if values.is_empty() {
        return TrendSummary {
            percentiles: percentiles.iter().map(|&p| (p, 0.0)).collect(),
            ..TrendSummary::default()
        };
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    TrendSummary {
        min: sorted[0],
        max: *sorted.last().unwrap(),
        avg: sorted.iter().sum::<f64>() / sorted.len() as f64,
        percentiles: percentiles
            .iter()
            .map(|&p| (p, percentile(&sorted, f64::from(p))))
            .collect(),
        total: sorted.len() as u64,
    }
}

/// Percentile by linear interpolation between closest ranks. `sorted` must be
/// ascending and non-empty; `p` is in `[0, 100]`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        sorted[low]
    } else {
        sorted[low] + (sorted[high] - sorted[low]) * (rank - low as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_exact_rank() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 50.0), 3.0);
        assert_eq!(percentile(&values, 100.0), 5.0);
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let values = [10.0, 20.0];
        assert_eq!(percentile(&values, 50.0), 15.0);
        assert_eq!(percentile(&values, 75.0), 17.5);
    }

    #[test]
    fn empty_sequence_summarises_to_zero() {
        let summary = summarize(&[], &REPORT_PERCENTILES);
        assert_eq!(summary.min, 0.0);
        assert_eq!(summary.max, 0.0);
        assert_eq!(summary.avg, 0.0);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.percentiles.len(), REPORT_PERCENTILES.len());
        assert!(summary.percentiles.values().all(|&v| v == 0.0));
    }
}
