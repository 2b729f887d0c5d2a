use clap::Parser;
use stampede::cli::{Cli, Commands, InitArgs, ReportFormat, RunArgs};
use stampede::config::load_script;
use stampede::engine::pool::PoolConfig;
use stampede::engine::runner::Runner;
use stampede::error::Error;
use stampede::output::{write_json, write_markdown};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let exit_code = match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {error}");
            1
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> Result<i32, Error> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_script(&args).await,
        Commands::Init(args) => run_init(&args),
    }
}

async fn run_script(args: &RunArgs) -> Result<i32, Error> {
    let (options, module, http) = load_script(&args.script)?;

    let mut pool_config = PoolConfig::default();
    if let Some(min_workers) = args.min_workers {
        pool_config.min_workers = min_workers;
    }
    if let Some(max_workers) = args.max_workers {
        pool_config.max_workers = max_workers;
    }
    if let Some(max_tasks) = args.max_tasks_per_worker {
        pool_config.max_tasks_per_worker = max_tasks;
    }

    let runner = Runner::new(options, module)
        .pool_config(pool_config)
        .http_settings(http)
        .progress_interval(args.progress_interval)
        .quiet(args.quiet);
    let outcome = runner.run().await?;

    if let Some(path) = &args.output {
        match args.format {
            ReportFormat::Json => write_json(path, &outcome)?,
            ReportFormat::Markdown => write_markdown(path, &outcome)?,
        }
        eprintln!("Wrote report: {}", path.display());
    }

    if outcome.passed {
        println!("\x1b[32m✓ PASS\x1b[0m in {:.1}s", outcome.elapsed.as_secs_f64());
        Ok(0)
    } else {
        println!("\x1b[31m✗ FAIL\x1b[0m in {:.1}s", outcome.elapsed.as_secs_f64());
        Ok(1)
    }
}

fn run_init(args: &InitArgs) -> Result<i32, Error> {
    if args.output.exists() && !args.force {
        return Err(Error::Config(format!(
            "file '{}' already exists. Use --force to overwrite.",
            args.output.display()
        )));
    }

    std::fs::write(&args.output, SAMPLE_SCRIPT)?;
    eprintln!("Created test script: {}", args.output.display());
    eprintln!("\nRun with: stampede run {}", args.output.display());

    Ok(0)
}

const SAMPLE_SCRIPT: &str = r#"# stampede test script

# Workload shapes. Executors: per-vu-iterations, shared-iterations,
# constant-vus. Durations use humantime strings ("90s", "1m 30s").
[scenarios.smoke]
executor = "per-vu-iterations"
vus = 4
iterations = 10
max_duration = "1m"
# graceful_stop = "30s"

# [scenarios.soak]
# executor = "constant-vus"
# vus = 20
# duration = "5m"

# Requests performed by every iteration, in order. ${VU_ID} and ${ITERATION}
# interpolate per iteration; ${ENV_VAR} and ${ENV_VAR:-default} resolve from
# the environment at load time.
[[requests]]
name = "health"
method = "GET"
url = "http://localhost:8080/health"

# [[requests]]
# name = "create_order"
# method = "POST"
# url = "http://localhost:8080/users/${VU_ID}/orders"
# body = '{"idempotency_key": "${VU_ID}-${ITERATION}"}'
# [requests.headers]
# Content-Type = "application/json"

# Pass/fail rules over the final report. stat: min|max|avg|p50|p90|p95|p99|count
[[thresholds]]
metric = "iterations"
tag = "fail"
stat = "count"
op = "=="
value = 0

# [[thresholds]]
# metric = "fetch"
# stat = "p95"
# op = "<"
# value = 250.0

# Per-VU HTTP client tuning.
# [http]
# timeout = "30s"
# connect_timeout = "10s"
# insecure = false
"#;
