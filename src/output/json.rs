use crate::engine::report::Report;
use crate::engine::runner::RunOutcome;
use crate::error::Error;
use crate::types::ScenarioState;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Serialize)]
struct JsonReport<'a> {
    metadata: Metadata,
    states: BTreeMap<&'a str, &'a ScenarioState>,
    report: &'a Report,
}

#[derive(Serialize)]
struct Metadata {
    tool: &'static str,
    version: &'static str,
    generated_at: String,
    passed: bool,
    elapsed_secs: f64,
}

/// Write the final report, scenario states, and run metadata as pretty JSON.
pub fn write_json(path: &Path, outcome: &RunOutcome) -> Result<(), Error> {
    let document = JsonReport {
        metadata: Metadata {
            tool: "stampede",
            version: env!("CARGO_PKG_VERSION"),
            generated_at: chrono::Utc::now().to_rfc3339(),
            passed: outcome.passed,
            elapsed_secs: outcome.elapsed.as_secs_f64(),
        },
        states: outcome
            .states
            .iter()
            .map(|(name, state)| (name.as_str(), state))
            .collect(),
        report: &outcome.report,
    };
    let json = serde_json::to_string_pretty(&document)?;
    std::fs::write(path, json)?;
    Ok(())
}
