use crate::engine::pool::WorkerPool;
use crate::engine::rpc::{IterationsCall, WorkerCall};
use crate::error::Error;
use crate::types::{Progress, ScenarioOptions, ScenarioState};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Extra allowance on `iterations` RPC timeouts so the worker can honour the
/// graceful stop before the supervisor gives up on the call.
const RPC_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

/// Iteration-count sentinel for duration-bounded batches; the VU's deadline
/// is what actually ends them.
const UNBOUNDED_ITERATIONS: u64 = u64::MAX;

/// Translates one scenario's options into `iterations` RPC fan-out against
/// the pool. Deadlines are the VU runtime's job; the executor only sizes the
/// RPC timeouts generously enough not to preempt the graceful stop.
pub struct Executor {
    scenario: String,
    options: ScenarioOptions,
    pool: Arc<WorkerPool>,
    current_vus: AtomicU64,
    started: OnceLock<Instant>,
}

impl Executor {
    pub fn new(scenario: String, options: ScenarioOptions, pool: Arc<WorkerPool>) -> Self {
        Self {
            scenario,
            options,
            pool,
            current_vus: AtomicU64::new(0),
            started: OnceLock::new(),
        }
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn max_vus(&self) -> u64 {
        self.options.vus()
    }

    /// VUs that have been put to work so far.
    pub fn current_vus(&self) -> u64 {
        self.current_vus.load(Ordering::Relaxed)
    }

    /// Resolves once every RPC of the scenario has settled; only then does
    /// the first failure propagate, so a failed batch never strands the rest.
    pub async fn execute(&self) -> Result<(), Error> {
        self.started.get_or_init(Instant::now);
        match self.options.clone() {
            ScenarioOptions::PerVuIterations {
                vus,
                iterations,
                max_duration,
                graceful_stop,
            } => self.run_batches(vus, iterations, max_duration, graceful_stop).await,
            ScenarioOptions::ConstantVus {
                vus,
                duration,
                graceful_stop,
            } => self.run_batches(vus, UNBOUNDED_ITERATIONS, duration, graceful_stop).await,
            ScenarioOptions::SharedIterations {
                vus,
                iterations,
                max_duration,
                graceful_stop,
            } => self.run_shared(vus, iterations, max_duration, graceful_stop).await,
        }
    }

    /// One batch RPC per VU (per-vu-iterations and constant-vus).
    async fn run_batches(
        &self,
        vus: u64,
        nb_iter: u64,
        max_duration: Duration,
        graceful_stop: Duration,
    ) -> Result<(), Error> {
        let timeout = max_duration + graceful_stop + RPC_TIMEOUT_SLACK;
        let batches = (0..vus).map(|vu_id| {
            let call = IterationsCall {
                scenario: self.scenario.clone(),
                vu_id,
                nb_iter,
                max_duration,
                graceful_stop,
            };
            async move {
                self.current_vus.fetch_add(1, Ordering::Relaxed);
                self.pool
                    .remote_procedure_call(WorkerCall::Iterations(call), timeout)
                    .await
                    .map(|_| ())
            }
        });
        settle(join_all(batches).await)
    }

    /// Shared-iterations: VU slots race to reserve single iterations off one
    /// counter until the budget or the scenario deadline runs out.
    async fn run_shared(
        &self,
        vus: u64,
        iterations: u64,
        max_duration: Duration,
        graceful_stop: Duration,
    ) -> Result<(), Error> {
        let reserved = AtomicU64::new(0);
        let abort_at = Instant::now() + max_duration;
        let slots = (0..vus).map(|vu_id| {
            let reserved = &reserved;
            async move {
                let mut engaged = false;
                while reserved
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |done| {
                        (done < iterations).then_some(done + 1)
                    })
                    .is_ok()
                {
                    if !engaged {
                        self.current_vus.fetch_add(1, Ordering::Relaxed);
                        engaged = true;
                    }
                    let remaining = abort_at.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    let call = IterationsCall {
                        scenario: self.scenario.clone(),
                        vu_id,
                        nb_iter: 1,
                        max_duration: remaining,
                        graceful_stop,
                    };
                    self.pool
                        .remote_procedure_call(
                            WorkerCall::Iterations(call),
                            remaining + graceful_stop + RPC_TIMEOUT_SLACK,
                        )
                        .await?;
                }
                Ok(())
            }
        });
        settle(join_all(slots).await)
    }

    pub fn progress(&self, state: &ScenarioState) -> Progress {
        match &self.options {
            ScenarioOptions::PerVuIterations { vus, iterations, .. } => {
                let total = vus * iterations;
                Progress {
                    percentage: percentage(state.iterations(), total),
                    extra: format!("{}/{} iters", state.iterations(), total),
                    aborted: state.aborted,
                }
            }
            ScenarioOptions::SharedIterations { iterations, .. } => Progress {
                percentage: percentage(state.iterations(), *iterations),
                extra: format!("{}/{} iters", state.iterations(), iterations),
                aborted: state.aborted,
            },
            ScenarioOptions::ConstantVus { duration, .. } => {
                let elapsed = self.started.get().map(Instant::elapsed).unwrap_or_default();
                let percentage = if elapsed >= *duration {
                    100.0
                } else {
                    elapsed.as_secs_f64() / duration.as_secs_f64() * 100.0
                };
                Progress {
                    percentage,
                    extra: format!("{} iters", state.iterations()),
                    aborted: state.aborted,
                }
            }
        }
    }
}

fn percentage(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (done as f64 / total as f64 * 100.0).min(100.0)
    }
}

/// Await-all-then-propagate: every outcome has settled by the time the first
/// error is returned.
fn settle(results: Vec<Result<(), Error>>) -> Result<(), Error> {
    for result in results {
        result?;
    }
    Ok(())
}
