mod json;
mod markdown;

pub use json::write_json;
pub use markdown::write_markdown;

use crate::engine::report::{Report, TrendSummary};
use crate::types::ScenarioState;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub const BAR_WIDTH: usize = 50;

/// `MMmSSs` running-time stamp for the progress header.
pub fn format_running_time(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{:02}m{:02}s", total / 60, total % 60)
}

/// 50-column bar, `=` filled and `-` empty in proportion to `percentage`.
pub fn progress_bar(percentage: f64) -> String {
    let filled = ((percentage.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64).round() as usize;
    let mut bar = String::with_capacity(BAR_WIDTH);
    for column in 0..BAR_WIDTH {
        bar.push(if column < filled { '=' } else { '-' });
    }
    bar
}

/// Repaintable region on stderr: each draw rewinds over the previous one, and
/// `clear` erases the region entirely.
#[derive(Default)]
pub struct ProgressScreen {
    lines: usize,
}

impl ProgressScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, lines: &[String]) {
        self.rewind();
        for line in lines {
            eprintln!("{line}");
        }
        self.lines = lines.len();
    }

    pub fn clear(&mut self) {
        self.rewind();
        self.lines = 0;
    }

    fn rewind(&self) {
        if self.lines > 0 {
            eprint!("\x1b[{}A\x1b[0J", self.lines);
        }
    }
}

/// Final metrics table on stdout. Trend values are milliseconds.
pub fn print_report(report: &Report, states: &HashMap<String, ScenarioState>) {
    println!();
    println!("{}", "=".repeat(100));
    println!("METRICS");
    println!("{}", "=".repeat(100));

    for (name, tags) in &report.trends {
        println!();
        println!("{name} (ms)");
        println!(
            "  {:<18} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>7}",
            "tag", "min", "max", "avg", "p50", "p90", "p95", "p99", "total"
        );
        for (tag, summary) in tags {
            print_trend_row(tag, summary);
        }
    }

    if !report.counters.is_empty() {
        println!();
        println!("counters");
        for (name, tags) in &report.counters {
            for (tag, value) in tags {
                println!("  {name}{{{tag}}} = {value}");
            }
        }
    }

    if !states.is_empty() {
        println!();
        println!("scenarios");
        for (name, state) in states.iter().collect::<BTreeMap<_, _>>() {
            println!(
                "  {name}: {} succeeded, {} failed{}",
                state.success,
                state.fail,
                if state.aborted { ", aborted" } else { "" }
            );
        }
    }
    println!();
}

fn print_trend_row(tag: &str, summary: &TrendSummary) {
    let p = |p: u8| summary.percentiles.get(&p).copied().unwrap_or(0.0);
    println!(
        "  {:<18} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>7}",
        tag,
        summary.min,
        summary.max,
        summary.avg,
        p(50),
        p(90),
        p(95),
        p(99),
        summary.total
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_time_is_minutes_and_seconds() {
        assert_eq!(format_running_time(Duration::from_secs(0)), "00m00s");
        assert_eq!(format_running_time(Duration::from_secs(65)), "01m05s");
        assert_eq!(format_running_time(Duration::from_secs(601)), "10m01s");
    }

    #[test]
    fn bar_is_fifty_columns() {
        assert_eq!(progress_bar(0.0), "-".repeat(BAR_WIDTH));
        assert_eq!(progress_bar(100.0), "=".repeat(BAR_WIDTH));
        assert_eq!(progress_bar(150.0), "=".repeat(BAR_WIDTH));
        let half = progress_bar(50.0);
        assert_eq!(half.len(), BAR_WIDTH);
        assert_eq!(half.chars().filter(|&c| c == '=').count(), BAR_WIDTH / 2);
    }
}
