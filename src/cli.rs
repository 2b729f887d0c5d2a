use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

#[derive(Parser, Debug)]
#[command(
    name = "stampede",
    author,
    version,
    about = "A scriptable VU-based HTTP load testing engine",
    long_about = "stampede drives a test script's requests through fleets of virtual users\n\
                  and reports tagged latency trends with a pass/fail verdict."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a test script
    Run(RunArgs),
    /// Write a commented sample test script
    Init(InitArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the test script (TOML)
    pub script: PathBuf,

    /// Suppress live progress and the metrics table (for CI)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Write the final report to a file
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Report file format
    #[arg(long, value_enum, default_value = "json")]
    pub format: ReportFormat,

    /// Progress repaint interval
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub progress_interval: Duration,

    /// Workers created eagerly before load balancing kicks in
    #[arg(long)]
    pub min_workers: Option<usize>,

    /// Upper bound on spawned workers (default: available parallelism)
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Concurrent iteration batches per worker before callers queue
    #[arg(long)]
    pub max_tasks_per_worker: Option<usize>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    #[value(alias = "md")]
    Markdown,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Output path for the sample script
    #[arg(default_value = "stampede.toml")]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
