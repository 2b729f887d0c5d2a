use crate::engine::registry::RegistrySnapshot;
use crate::engine::rpc::{IterationsCall, RpcRequest, RpcResponse, WorkerCall, WorkerReply};
use crate::engine::vu::Vu;
use crate::error::Error;
use crate::http::HttpSettings;
use crate::module::TestModule;
use crate::types::ScenarioState;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

type VuMap = Arc<Mutex<HashMap<(String, u64), Arc<Vu>>>>;

/// One worker task: hosts VUs for any scenario and serves the pool's RPCs.
///
/// `setupWorker` is answered inline, without suspension, so the worker is
/// ready the moment its first response lands. Iteration batches run as
/// subtasks of a `JoinSet`, so aborting the worker kills everything it hosts.
pub async fn worker_main(
    mut requests: mpsc::UnboundedReceiver<RpcRequest>,
    responses: mpsc::UnboundedSender<RpcResponse>,
    module: Arc<dyn TestModule>,
    http: HttpSettings,
) {
    let mut worker_id: u64 = 0;
    let vus: VuMap = VuMap::default();
    let mut batches: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(RpcRequest { id, call }) = request else { break };
                match call {
                    WorkerCall::SetupWorker { worker_id: assigned } => {
                        worker_id = assigned;
                        tracing::debug!(worker = worker_id, "worker ready");
                        let _ = responses.send(RpcResponse { id, result: Ok(WorkerReply::Done) });
                    }
                    WorkerCall::Iterations(call) => match checkout_vu(&vus, worker_id, &call, &module, &http) {
                        Ok(vu) => {
                            let responses = responses.clone();
                            batches.spawn(async move {
                                vu.do_iterations(call.nb_iter, call.max_duration, call.graceful_stop).await;
                                let _ = responses.send(RpcResponse { id, result: Ok(WorkerReply::Done) });
                            });
                        }
                        Err(error) => {
                            let _ = responses.send(RpcResponse { id, result: Err(error.to_string()) });
                        }
                    },
                    WorkerCall::ScenariosState => {
                        let mut states: HashMap<String, ScenarioState> = HashMap::new();
                        for ((scenario, _), vu) in vus.lock().unwrap().iter() {
                            states.entry(scenario.clone()).or_default().merge(&vu.scenario_state());
                        }
                        let _ = responses.send(RpcResponse { id, result: Ok(WorkerReply::ScenariosState(states)) });
                    }
                    WorkerCall::Metrics => {
                        let snapshots: Vec<RegistrySnapshot> =
                            vus.lock().unwrap().values().map(|vu| vu.metrics()).collect();
                        let merged = RegistrySnapshot::merge(snapshots);
                        let _ = responses.send(RpcResponse { id, result: Ok(WorkerReply::Metrics(merged)) });
                    }
                }
            }
            Some(_) = batches.join_next(), if !batches.is_empty() => {}
        }
    }

    // Channel closed: let running batches settle before the task exits.
    while batches.join_next().await.is_some() {}
    tracing::debug!(worker = worker_id, "worker stopped");
}

/// One VU per `(scenario, vu_id)` pair, ever: a repeat `iterations` call gets
/// the existing VU and appends to its totals.
fn checkout_vu(
    vus: &VuMap,
    worker_id: u64,
    call: &IterationsCall,
    module: &Arc<dyn TestModule>,
    http: &HttpSettings,
) -> Result<Arc<Vu>, Error> {
    let mut map = vus.lock().unwrap();
    match map.entry((call.scenario.clone(), call.vu_id)) {
        Entry::Occupied(existing) => Ok(existing.get().clone()),
        Entry::Vacant(slot) => {
            tracing::debug!(
                worker = worker_id,
                scenario = %call.scenario,
                vu = call.vu_id,
                "starting vu"
            );
            let vu = Arc::new(Vu::new(&call.scenario, call.vu_id, module.clone(), http)?);
            Ok(slot.insert(vu).clone())
        }
    }
}
