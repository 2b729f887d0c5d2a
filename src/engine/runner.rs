use crate::engine::executor::Executor;
use crate::engine::pool::{PoolConfig, WorkerPool};
use crate::engine::registry::RegistrySnapshot;
use crate::engine::report::{REPORT_PERCENTILES, Report, build_report};
use crate::engine::rpc::{WorkerCall, WorkerReply};
use crate::error::Error;
use crate::http::HttpSettings;
use crate::module::TestModule;
use crate::output::{ProgressScreen, format_running_time, print_report, progress_bar};
use crate::types::{Options, ScenarioState};
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const STATE_POLL_TIMEOUT: Duration = Duration::from_secs(10);
const METRICS_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives one whole run: executors over the pool, the progress printer, the
/// final merge/report/threshold pass, and pool teardown.
pub struct Runner {
    options: Options,
    module: Arc<dyn TestModule>,
    pool_config: PoolConfig,
    http: HttpSettings,
    progress_interval: Duration,
    quiet: bool,
}

/// What a run produced, independent of how it gets rendered.
pub struct RunOutcome {
    pub passed: bool,
    pub report: Report,
    pub states: HashMap<String, ScenarioState>,
    pub threshold_failure: Option<String>,
    pub elapsed: Duration,
}

impl Runner {
    pub fn new(options: Options, module: Arc<dyn TestModule>) -> Self {
        Self {
            options,
            module,
            pool_config: PoolConfig::default(),
            http: HttpSettings::default(),
            progress_interval: Duration::from_secs(1),
            quiet: false,
        }
    }

    pub fn pool_config(mut self, pool_config: PoolConfig) -> Self {
        self.pool_config = pool_config;
        self
    }

    pub fn http_settings(mut self, http: HttpSettings) -> Self {
        self.http = http;
        self
    }

    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Suppress the progress printer and the metrics table.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub async fn run(&self) -> Result<RunOutcome, Error> {
        // Configuration errors abort before any scenario starts.
        self.options.validate()?;
        let started = Instant::now();

        let pool = Arc::new(WorkerPool::new(
            self.pool_config.clone(),
            self.module.clone(),
            self.http.clone(),
        ));
        let executors: Vec<Arc<Executor>> = self
            .options
            .scenarios
            .iter()
            .map(|(name, options)| {
                Arc::new(Executor::new(name.clone(), options.clone(), pool.clone()))
            })
            .collect();

        let progress = (!self.quiet).then(|| {
            spawn_progress_printer(
                pool.clone(),
                executors.clone(),
                self.progress_interval,
                started,
            )
        });

        let results = join_all(executors.iter().map(|executor| executor.execute())).await;
        let mut failed = false;
        for (executor, result) in executors.iter().zip(&results) {
            if let Err(error) = result {
                failed = true;
                tracing::error!(scenario = executor.scenario(), "scenario failed: {error}");
            }
        }

        if let Some((cancel, printer)) = progress {
            cancel.cancel();
            let _ = printer.await;
        }

        let states = poll_states(&pool).await;

        // Merge metrics across workers. A missing worker degrades the report
        // and fails the run, but never skips collection.
        let mut snapshots = Vec::new();
        for outcome in pool.for_each_worker(WorkerCall::Metrics, METRICS_TIMEOUT).await {
            match outcome {
                Ok(WorkerReply::Metrics(snapshot)) => snapshots.push(snapshot),
                Ok(_) => {}
                Err(error) => {
                    failed = true;
                    tracing::error!("metrics collection failed: {error}");
                }
            }
        }
        let report = build_report(&RegistrySnapshot::merge(snapshots), &REPORT_PERCENTILES);

        let threshold_failure = self
            .options
            .threshold
            .as_ref()
            .and_then(|threshold| threshold(&report).err());
        if let Some(message) = &threshold_failure {
            failed = true;
            println!("threshold failed: {message}");
        }

        if !self.quiet {
            print_report(&report, &states);
        }

        pool.terminate();

        Ok(RunOutcome {
            passed: !failed,
            report,
            states,
            threshold_failure,
            elapsed: started.elapsed(),
        })
    }
}

fn spawn_progress_printer(
    pool: Arc<WorkerPool>,
    executors: Vec<Arc<Executor>>,
    interval: Duration,
    started: Instant,
) -> (CancellationToken, JoinHandle<()>) {
    let cancel = CancellationToken::new();
    let printer = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let mut screen = ProgressScreen::new();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let states = poll_states(&pool).await;
                        screen.draw(&render(&executors, &states, started.elapsed()));
                    }
                    _ = cancel.cancelled() => break,
                }
            }
            screen.clear();
        }
    });
    (cancel, printer)
}

/// Poll every worker's scenario states and merge them per scenario.
async fn poll_states(pool: &WorkerPool) -> HashMap<String, ScenarioState> {
    let mut merged: HashMap<String, ScenarioState> = HashMap::new();
    for outcome in pool
        .for_each_worker(WorkerCall::ScenariosState, STATE_POLL_TIMEOUT)
        .await
    {
        match outcome {
            Ok(WorkerReply::ScenariosState(states)) => {
                for (scenario, state) in states {
                    merged.entry(scenario).or_default().merge(&state);
                }
            }
            Ok(_) => {}
            Err(error) => tracing::debug!("state poll failed: {error}"),
        }
    }
    merged
}

/// One summary line, then `<name> <mark> [<bar>] <extra>` per scenario.
fn render(
    executors: &[Arc<Executor>],
    states: &HashMap<String, ScenarioState>,
    elapsed: Duration,
) -> Vec<String> {
    let current: u64 = executors.iter().map(|e| e.current_vus()).sum();
    let max: u64 = executors.iter().map(|e| e.max_vus()).sum();
    let iterations: u64 = states.values().map(ScenarioState::iterations).sum();
    let mut lines = vec![format!(
        "running {}  {current}/{max} VUs  {iterations} iterations",
        format_running_time(elapsed)
    )];
    for executor in executors {
        let state = states.get(executor.scenario()).copied().unwrap_or_default();
        let progress = executor.progress(&state);
        let mark = if progress.aborted {
            '✗'
        } else if progress.percentage >= 100.0 {
            '✓'
        } else {
            ' '
        };
        lines.push(format!(
            "{} {} [{}] {}",
            executor.scenario(),
            mark,
            progress_bar(progress.percentage),
            progress.extra
        ));
    }
    lines
}
