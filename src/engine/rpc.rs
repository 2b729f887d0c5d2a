use crate::engine::registry::RegistrySnapshot;
use crate::error::Error;
use crate::types::ScenarioState;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Process-wide monotonic call id, unique across every worker channel.
static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(0);

/// Procedures served by a worker.
#[derive(Debug, Clone)]
pub enum WorkerCall {
    SetupWorker { worker_id: u64 },
    Iterations(IterationsCall),
    ScenariosState,
    Metrics,
}

impl WorkerCall {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerCall::SetupWorker { .. } => "setupWorker",
            WorkerCall::Iterations(_) => "iterations",
            WorkerCall::ScenariosState => "scenariosState",
            WorkerCall::Metrics => "metrics",
        }
    }
}

/// Parameters of one iteration batch for one VU.
#[derive(Debug, Clone)]
pub struct IterationsCall {
    pub scenario: String,
    pub vu_id: u64,
    pub nb_iter: u64,
    pub max_duration: Duration,
    pub graceful_stop: Duration,
}

#[derive(Debug)]
pub enum WorkerReply {
    Done,
    ScenariosState(HashMap<String, ScenarioState>),
    Metrics(RegistrySnapshot),
}

#[derive(Debug)]
pub struct RpcRequest {
    pub id: u64,
    pub call: WorkerCall,
}

#[derive(Debug)]
pub struct RpcResponse {
    pub id: u64,
    pub result: Result<WorkerReply, String>,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<WorkerReply, String>>>>>;

/// Client half of one worker channel: sends correlated requests and routes
/// responses back by id. Cheap to clone; all clones share the correlation
/// table.
#[derive(Clone)]
pub struct RpcClient {
    tx: mpsc::UnboundedSender<RpcRequest>,
    pending: Pending,
    router: Arc<JoinHandle<()>>,
}

impl RpcClient {
    pub fn new(
        tx: mpsc::UnboundedSender<RpcRequest>,
        mut rx: mpsc::UnboundedReceiver<RpcResponse>,
    ) -> Self {
        let pending: Pending = Pending::default();
        let router = {
            let pending = pending.clone();
            tokio::spawn(async move {
                while let Some(response) = rx.recv().await {
                    let slot = pending.lock().unwrap().remove(&response.id);
                    match slot {
                        Some(reply_tx) => {
                            let _ = reply_tx.send(response.result);
                        }
                        // Late reply for a timed-out call: observable, never fatal.
                        None => tracing::warn!(
                            id = response.id,
                            "rpc protocol error: response for unknown call id"
                        ),
                    }
                }
            })
        };
        Self {
            tx,
            pending,
            router: Arc::new(router),
        }
    }

    /// Queue a call without awaiting its response. The request is on the
    /// channel, ordered ahead of any later call, when this returns.
    pub fn start_call(&self, call: WorkerCall) -> PendingCall {
        let id = NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed);
        let name = call.name();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, reply_tx);
        if self.tx.send(RpcRequest { id, call }).is_err() {
            // Worker gone; dropping the sender fails the wait below.
            self.pending.lock().unwrap().remove(&id);
        }
        PendingCall {
            id,
            name,
            reply_rx,
            pending: self.pending.clone(),
        }
    }

    pub async fn call(&self, call: WorkerCall, timeout: Duration) -> Result<WorkerReply, Error> {
        self.start_call(call).wait(timeout).await
    }

    /// Fail every pending call with `worker terminate` and stop routing.
    pub fn shutdown(&self) {
        self.pending.lock().unwrap().clear();
        self.router.abort();
    }
}

pub struct PendingCall {
    id: u64,
    name: &'static str,
    reply_rx: oneshot::Receiver<Result<WorkerReply, String>>,
    pending: Pending,
}

impl PendingCall {
    pub async fn wait(self, timeout: Duration) -> Result<WorkerReply, Error> {
        match tokio::time::timeout(timeout, self.reply_rx).await {
            Ok(Ok(Ok(reply))) => Ok(reply),
            Ok(Ok(Err(message))) => Err(Error::RpcRemote(message)),
            Ok(Err(_)) => Err(Error::WorkerTerminated),
            Err(_) => {
                self.pending.lock().unwrap().remove(&self.id);
                Err(Error::RpcTimeout {
                    id: self.id,
                    name: self.name,
                })
            }
        }
    }
}
