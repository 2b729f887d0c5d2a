use crate::engine::rpc::{RpcClient, WorkerCall, WorkerReply};
use crate::engine::worker::worker_main;
use crate::error::Error;
use crate::http::HttpSettings;
use crate::module::TestModule;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const SETUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Workers created unconditionally before load balancing kicks in.
    pub min_workers: usize,
    /// Upper bound on spawned workers.
    pub max_workers: usize,
    /// In-flight RPCs a worker may carry before callers queue.
    pub max_tasks_per_worker: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            min_workers: 1,
            max_workers: parallelism,
            max_tasks_per_worker: 128,
        }
    }
}

/// Bounded worker fleet with fewest-tasks balancing and a FIFO queue of
/// parked callers. Bookkeeping lives behind one mutex that is never held
/// across an await; only RPC I/O and parking suspend.
pub struct WorkerPool {
    config: PoolConfig,
    module: Arc<dyn TestModule>,
    http: HttpSettings,
    terminated: AtomicBool,
    inner: Mutex<PoolInner>,
}

#[derive(Default)]
struct PoolInner {
    workers: Vec<WorkerSlot>,
    running: Vec<usize>,
    queue: VecDeque<oneshot::Sender<usize>>,
}

struct WorkerSlot {
    id: u64,
    client: RpcClient,
    task: JoinHandle<()>,
}

impl WorkerPool {
    pub fn new(mut config: PoolConfig, module: Arc<dyn TestModule>, http: HttpSettings) -> Self {
        config.max_workers = config.max_workers.max(config.min_workers).max(1);
        config.max_tasks_per_worker = config.max_tasks_per_worker.max(1);
        Self {
            config,
            module,
            http,
            terminated: AtomicBool::new(false),
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Pick (or create) a worker per the balancing rules and run one RPC on
    /// it. The slot is accounted from selection until the call settles, after
    /// which it is handed to the oldest parked caller.
    pub async fn remote_procedure_call(
        &self,
        call: WorkerCall,
        timeout: Duration,
    ) -> Result<WorkerReply, Error> {
        let (index, client) = self.checkout().await?;
        let result = client.call(call, timeout).await;
        self.settle(index);
        result
    }

    async fn checkout(&self) -> Result<(usize, RpcClient), Error> {
        let parked = {
            let mut inner = self.inner.lock().unwrap();
            if self.terminated.load(Ordering::Relaxed) {
                return Err(Error::WorkerTerminated);
            }
            if inner.workers.len() < self.config.min_workers {
                let index = self.spawn_worker(&mut inner);
                inner.running[index] += 1;
                return Ok((index, inner.workers[index].client.clone()));
            }
            let (index, load) = least_loaded(&inner.running);
            if load < self.config.max_tasks_per_worker {
                inner.running[index] += 1;
                return Ok((index, inner.workers[index].client.clone()));
            }
            if inner.workers.len() < self.config.max_workers {
                let index = self.spawn_worker(&mut inner);
                inner.running[index] += 1;
                return Ok((index, inner.workers[index].client.clone()));
            }
            // Every worker saturated: park until a slot frees up.
            let (wake_tx, wake_rx) = oneshot::channel();
            inner.queue.push_back(wake_tx);
            wake_rx
        };
        // Whoever wakes us has already transferred the slot's accounting.
        let index = parked.await.map_err(|_| Error::WorkerTerminated)?;
        let client = {
            let inner = self.inner.lock().unwrap();
            match inner.workers.get(index) {
                Some(worker) => worker.client.clone(),
                // Terminated between wakeup and here; the slot died with it.
                None => return Err(Error::WorkerTerminated),
            }
        };
        Ok((index, client))
    }

    fn settle(&self, index: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.running[index] -= 1;
        while let Some(waiter) = inner.queue.pop_front() {
            inner.running[index] += 1;
            if waiter.send(index).is_ok() {
                break;
            }
            // Parked caller gave up; try the next one.
            inner.running[index] -= 1;
        }
    }

    /// Fully synchronous: the worker enters the fleet initialised or not at
    /// all, and its `setupWorker` call is queued ahead of any user RPC.
    fn spawn_worker(&self, inner: &mut PoolInner) -> usize {
        let id = inner.workers.len() as u64;
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(worker_main(
            request_rx,
            response_tx,
            self.module.clone(),
            self.http.clone(),
        ));
        let client = RpcClient::new(request_tx, response_rx);
        let setup = client.start_call(WorkerCall::SetupWorker { worker_id: id });
        tokio::spawn(async move {
            if let Err(error) = setup.wait(SETUP_TIMEOUT).await {
                tracing::warn!(worker = id, "worker setup rpc failed: {error}");
            }
        });
        tracing::debug!(worker = id, "spawned worker");
        inner.workers.push(WorkerSlot { id, client, task });
        inner.running.push(0);
        inner.workers.len() - 1
    }

    /// Issue `call` to every live worker concurrently; settled outcomes come
    /// back in worker-creation order. Bypasses task accounting.
    pub async fn for_each_worker(
        &self,
        call: WorkerCall,
        timeout: Duration,
    ) -> Vec<Result<WorkerReply, Error>> {
        let clients: Vec<RpcClient> = {
            let inner = self.inner.lock().unwrap();
            inner.workers.iter().map(|w| w.client.clone()).collect()
        };
        futures_util::future::join_all(clients.into_iter().map(|client| {
            let call = call.clone();
            async move { client.call(call, timeout).await }
        }))
        .await
    }

    /// Unconditional shutdown: parked callers are rejected, pending RPCs fail
    /// with `worker terminate`, worker tasks and their batches are aborted.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Relaxed);
        let (queue, workers) = {
            let mut inner = self.inner.lock().unwrap();
            (
                std::mem::take(&mut inner.queue),
                std::mem::take(&mut inner.workers),
            )
        };
        drop(queue);
        for worker in workers {
            worker.client.shutdown();
            worker.task.abort();
            tracing::debug!(worker = worker.id, "terminated worker");
        }
    }

    pub fn worker_count(&self) -> usize {
        self.inner.lock().unwrap().workers.len()
    }

    /// Worker ids in creation order.
    pub fn worker_ids(&self) -> Vec<u64> {
        self.inner.lock().unwrap().workers.iter().map(|w| w.id).collect()
    }

    /// In-flight RPC counts per worker, in creation order.
    pub fn running_tasks(&self) -> Vec<usize> {
        self.inner.lock().unwrap().running.clone()
    }

    pub fn parked_callers(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }
}

fn least_loaded(running: &[usize]) -> (usize, usize) {
    let mut index = 0;
    let mut load = usize::MAX;
    for (i, &tasks) in running.iter().enumerate() {
        if tasks < load {
            index = i;
            load = tasks;
        }
    }
    (index, load)
}
