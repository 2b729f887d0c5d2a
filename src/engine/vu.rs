use crate::engine::registry::{CounterHandle, Registry, RegistrySnapshot, TrendHandle};
use crate::error::{Error, FetchError};
use crate::http::{HttpSettings, create_vu_client};
use crate::module::TestModule;
use crate::types::ScenarioState;
use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// One virtual user: a private metrics registry, outcome counters, and an
/// HTTP client whose cookie jar no other VU can see. Created by its worker on
/// the first `iterations` call for a `(scenario, vu_id)` pair and reused for
/// every later batch of that pair.
pub struct Vu {
    id: u64,
    scenario: String,
    registry: Registry,
    success: AtomicU64,
    fail: AtomicU64,
    aborted: AtomicBool,
    client: reqwest::Client,
    module: Arc<dyn TestModule>,
    // Batches for the same VU run one at a time; state reads stay lock-free.
    run_lock: tokio::sync::Mutex<()>,
}

impl Vu {
    pub fn new(
        scenario: &str,
        id: u64,
        module: Arc<dyn TestModule>,
        http: &HttpSettings,
    ) -> Result<Self, Error> {
        Ok(Self {
            id,
            scenario: scenario.to_string(),
            registry: Registry::new(),
            success: AtomicU64::new(0),
            fail: AtomicU64::new(0),
            aborted: AtomicBool::new(false),
            client: create_vu_client(http)?,
            module,
            run_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run up to `nb_iter` iterations of the module, strictly in sequence.
    ///
    /// The whole batch shares one deadline at `max_duration` from entry; the
    /// same abort signal is injected into every fetch of the batch. An
    /// iteration in flight when the deadline fires gets `graceful_stop` extra
    /// wall-clock time: settling in the window is attributed normally,
    /// overrunning it is recorded as a failure and aborts the VU. Once the
    /// signal has fired and nothing is in flight, the batch returns
    /// immediately.
    pub async fn do_iterations(&self, nb_iter: u64, max_duration: Duration, graceful_stop: Duration) {
        let _running = self.run_lock.lock().await;
        let cancel = CancellationToken::new();
        let deadline = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(max_duration).await;
                cancel.cancel();
            })
        };
        let ctx = VuContext {
            vu_id: self.id,
            client: self.client.clone(),
            registry: self.registry.clone(),
            cancel: cancel.clone(),
        };
        let trend = self.registry.trend("iterations");
        let count = self.registry.counter("iterations");

        for iteration in 0..nb_iter {
            if cancel.is_cancelled() {
                self.aborted.store(true, Ordering::Relaxed);
                break;
            }
            let started = Instant::now();
            let mut call = self.module.call(ctx.clone(), self.id, iteration);
            let outcome = tokio::select! {
                result = &mut call => Some(result),
                _ = cancel.cancelled() => {
                    // Deadline hit mid-iteration: grant the graceful window.
                    match tokio::time::timeout(graceful_stop, &mut call).await {
                        Ok(result) => Some(result),
                        Err(_) => None,
                    }
                }
            };
            let elapsed = duration_ms(started.elapsed());
            match outcome {
                Some(Ok(())) => {
                    trend.add(elapsed, &["success"]);
                    count.add(1.0, &["success"]);
                    self.success.fetch_add(1, Ordering::Relaxed);
                }
                Some(Err(error)) => {
                    trend.add(elapsed, &["fail"]);
                    count.add(1.0, &["fail"]);
                    self.fail.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        scenario = %self.scenario,
                        vu = self.id,
                        iteration,
                        "iteration failed: {error}"
                    );
                }
                None => {
                    trend.add(elapsed, &["fail"]);
                    count.add(1.0, &["fail"]);
                    self.fail.fetch_add(1, Ordering::Relaxed);
                    self.aborted.store(true, Ordering::Relaxed);
                    tracing::warn!(
                        scenario = %self.scenario,
                        vu = self.id,
                        iteration,
                        "iteration ran past the graceful-stop window"
                    );
                    break;
                }
            }
        }
        deadline.abort();
    }

    pub fn scenario_state(&self) -> ScenarioState {
        ScenarioState {
            success: self.success.load(Ordering::Relaxed),
            fail: self.fail.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
        }
    }

    pub fn metrics(&self) -> RegistrySnapshot {
        self.registry.snapshot()
    }
}

/// What an iteration sees of its VU: the instrumented fetch, the VU id, and
/// handles for custom metrics. Clones share the VU's registry, client, and
/// the batch's abort signal.
#[derive(Clone)]
pub struct VuContext {
    vu_id: u64,
    client: reqwest::Client,
    registry: Registry,
    cancel: CancellationToken,
}

impl VuContext {
    pub fn vu_id(&self) -> u64 {
        self.vu_id
    }

    /// Start building a request bound to this VU's client.
    pub fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client.request(method, url)
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.request(reqwest::Method::GET, url)
    }

    /// Custom trend in the VU's registry; rides the normal merge/report path.
    pub fn trend(&self, name: &str) -> TrendHandle {
        self.registry.trend(name)
    }

    pub fn counter(&self, name: &str) -> CounterHandle {
        self.registry.counter(name)
    }

    /// The instrumented fetch: times the request from call to settle, records
    /// it into the `fetch` trend (reason phrase on success, `"fail"` on
    /// error), and races it against the batch's abort signal.
    pub async fn fetch(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, FetchError> {
        let started = Instant::now();
        let result = tokio::select! {
            result = request.send() => result.map_err(FetchError::from),
            _ = self.cancel.cancelled() => Err(FetchError::Aborted),
        };
        let elapsed = duration_ms(started.elapsed());
        let trend = self.registry.trend("fetch");
        match &result {
            Ok(response) => trend.add(elapsed, &[status_tag(response.status()).as_ref()]),
            Err(_) => trend.add(elapsed, &["fail"]),
        }
        result
    }
}

/// Trend tag for a successful response: the canonical reason phrase, or the
/// numeric code for statuses without one. Never empty.
fn status_tag(status: reqwest::StatusCode) -> Cow<'static, str> {
    match status.canonical_reason() {
        Some(reason) => Cow::Borrowed(reason),
        None => Cow::Owned(status.as_u16().to_string()),
    }
}

fn duration_ms(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
