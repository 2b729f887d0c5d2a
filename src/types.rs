use crate::engine::report::Report;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn default_max_duration() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}

/// Workload shape of one scenario, keyed by the `executor` field in scripts.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "executor")]
pub enum ScenarioOptions {
    /// Every VU runs its own fixed number of iterations.
    #[serde(rename = "per-vu-iterations")]
    PerVuIterations {
        vus: u64,
        iterations: u64,
        #[serde(default = "default_max_duration", with = "humantime_serde")]
        max_duration: Duration,
        #[serde(default = "default_graceful_stop", with = "humantime_serde")]
        graceful_stop: Duration,
    },

    /// A single iteration budget drained by up to `vus` VUs in parallel.
    #[serde(rename = "shared-iterations")]
    SharedIterations {
        vus: u64,
        iterations: u64,
        #[serde(default = "default_max_duration", with = "humantime_serde")]
        max_duration: Duration,
        #[serde(default = "default_graceful_stop", with = "humantime_serde")]
        graceful_stop: Duration,
    },

    /// A fixed fleet of VUs iterating for a fixed wall-clock duration.
    #[serde(rename = "constant-vus")]
    ConstantVus {
        vus: u64,
        #[serde(with = "humantime_serde")]
        duration: Duration,
        #[serde(default = "default_graceful_stop", with = "humantime_serde")]
        graceful_stop: Duration,
    },
}

impl ScenarioOptions {
    pub fn vus(&self) -> u64 {
        match self {
            ScenarioOptions::PerVuIterations { vus, .. }
            | ScenarioOptions::SharedIterations { vus, .. }
            | ScenarioOptions::ConstantVus { vus, .. } => *vus,
        }
    }

    pub fn validate(&self, name: &str) -> Result<(), Error> {
        if self.vus() == 0 {
            return Err(Error::Config(format!(
                "scenario '{name}': vus must be at least 1"
            )));
        }
        match self {
            ScenarioOptions::PerVuIterations { iterations, .. }
            | ScenarioOptions::SharedIterations { iterations, .. } => {
                if *iterations == 0 {
                    return Err(Error::Config(format!(
                        "scenario '{name}': iterations must be at least 1"
                    )));
                }
            }
            ScenarioOptions::ConstantVus { duration, .. } => {
                if duration.is_zero() {
                    return Err(Error::Config(format!(
                        "scenario '{name}': duration must be positive"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// The opaque threshold hook: inspects the final report and returns, or fails
/// with a message. The runner never looks inside.
pub type ThresholdFn = Arc<dyn Fn(&Report) -> Result<(), String> + Send + Sync>;

/// Everything a test module declares about the run: the scenario map (stable
/// order, unique names) and an optional threshold.
#[derive(Clone, Default)]
pub struct Options {
    pub scenarios: Vec<(String, ScenarioOptions)>,
    pub threshold: Option<ThresholdFn>,
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("scenarios", &self.scenarios)
            .field("threshold", &self.threshold.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Options {
    pub fn validate(&self) -> Result<(), Error> {
        if self.scenarios.is_empty() {
            return Err(Error::Config("no scenarios defined".to_string()));
        }
        let mut seen = HashSet::new();
        for (name, scenario) in &self.scenarios {
            if !seen.insert(name.as_str()) {
                return Err(Error::Config(format!("duplicate scenario name: {name}")));
            }
            scenario.validate(name)?;
        }
        Ok(())
    }
}

/// Merged outcome counters for one scenario. Counters only grow; `aborted`
/// latches true once any VU aborts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioState {
    pub success: u64,
    pub fail: u64,
    pub aborted: bool,
}

impl ScenarioState {
    pub fn merge(&mut self, other: &ScenarioState) {
        self.success += other.success;
        self.fail += other.fail;
        self.aborted |= other.aborted;
    }

    pub fn iterations(&self) -> u64 {
        self.success + self.fail
    }
}

/// Executor progress as consumed by the progress printer.
#[derive(Debug, Clone)]
pub struct Progress {
    pub percentage: f64,
    pub extra: String,
    pub aborted: bool,
}
