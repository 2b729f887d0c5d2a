use crate::engine::runner::RunOutcome;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Write the final report as a Markdown document.
pub fn write_markdown(path: &Path, outcome: &RunOutcome) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_markdown_content(&mut writer, outcome)
}

fn write_markdown_content<W: Write>(writer: &mut W, outcome: &RunOutcome) -> io::Result<()> {
    writeln!(writer, "# Load Test Results")?;
    writeln!(writer)?;
    writeln!(
        writer,
        "**{}** in {:.1}s",
        if outcome.passed { "PASS" } else { "FAIL" },
        outcome.elapsed.as_secs_f64()
    )?;
    if let Some(message) = &outcome.threshold_failure {
        writeln!(writer)?;
        writeln!(writer, "Threshold failed: `{message}`")?;
    }
    writeln!(writer)?;

    writeln!(writer, "## Scenarios")?;
    writeln!(writer)?;
    writeln!(writer, "| Scenario | Succeeded | Failed | Aborted |")?;
    writeln!(writer, "|----------|-----------|--------|---------|")?;
    for (name, state) in outcome.states.iter().collect::<BTreeMap<_, _>>() {
        writeln!(
            writer,
            "| {} | {} | {} | {} |",
            name,
            state.success,
            state.fail,
            if state.aborted { "yes" } else { "no" }
        )?;
    }
    writeln!(writer)?;

    for (name, tags) in &outcome.report.trends {
        writeln!(writer, "## Trend `{name}` (ms)")?;
        writeln!(writer)?;
        writeln!(
            writer,
            "| Tag | Min | Max | Avg | p50 | p90 | p95 | p99 | Total |"
        )?;
        writeln!(
            writer,
            "|-----|-----|-----|-----|-----|-----|-----|-----|-------|"
        )?;
        for (tag, summary) in tags {
            let p = |p: u8| summary.percentiles.get(&p).copied().unwrap_or(0.0);
            writeln!(
                writer,
                "| `{}` | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} | {} |",
                tag,
                summary.min,
                summary.max,
                summary.avg,
                p(50),
                p(90),
                p(95),
                p(99),
                summary.total
            )?;
        }
        writeln!(writer)?;
    }

    if !outcome.report.counters.is_empty() {
        writeln!(writer, "## Counters")?;
        writeln!(writer)?;
        writeln!(writer, "| Counter | Tag | Value |")?;
        writeln!(writer, "|---------|-----|-------|")?;
        for (name, tags) in &outcome.report.counters {
            for (tag, value) in tags {
                writeln!(writer, "| {name} | `{tag}` | {value} |")?;
            }
        }
        writeln!(writer)?;
    }

    Ok(())
}
