//! Layout on a background task.
//!
//! `LayoutWorker` wraps any `LayoutOracle` and runs it off the caller's
//! task. Requests carry a monotonically increasing id; the worker echoes it
//! in the response and a dispatcher routes each response to the caller
//! waiting on that id, so concurrent requests may complete in any order.
//!
//! There is no cancellation or timeout. A caller that goes away simply
//! drops its response.

use async_trait::async_trait;
use cs_core::{Anchor, LayoutGraph, LayoutOptions, LayoutOracle, LayoutResult, SyncError, SyncResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};

const QUEUE_DEPTH: usize = 32;

struct LayoutRequest {
    id: u64,
    graph: LayoutGraph,
    options: LayoutOptions,
}

struct LayoutResponse {
    id: u64,
    result: SyncResult<LayoutResult>,
}

type Responder = oneshot::Sender<SyncResult<LayoutResult>>;
type Pending = Arc<Mutex<HashMap<u64, Responder>>>;

fn lock(pending: &Pending) -> MutexGuard<'_, HashMap<u64, Responder>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct LayoutWorker {
    anchor: Anchor,
    next_id: AtomicU64,
    requests: mpsc::Sender<LayoutRequest>,
    pending: Pending,
}

impl LayoutWorker {
    /// Start the worker and its dispatcher on the current tokio runtime.
    pub fn spawn(oracle: Arc<dyn LayoutOracle>) -> Self {
        let anchor = oracle.anchor();
        let (request_tx, request_rx) = mpsc::channel(QUEUE_DEPTH);
        let (response_tx, response_rx) = mpsc::channel(QUEUE_DEPTH);
        let pending = Pending::default();

        tokio::spawn(serve(oracle, request_rx, response_tx));
        tokio::spawn(dispatch(response_rx, pending.clone()));

        Self {
            anchor,
            next_id: AtomicU64::new(1),
            requests: request_tx,
            pending,
        }
    }

    /// Requests sent and not yet answered.
    pub fn in_flight(&self) -> usize {
        lock(&self.pending).len()
    }
}

/// Worker side: one task per request, answered with the request's id.
async fn serve(
    oracle: Arc<dyn LayoutOracle>,
    mut requests: mpsc::Receiver<LayoutRequest>,
    responses: mpsc::Sender<LayoutResponse>,
) {
    while let Some(LayoutRequest { id, graph, options }) = requests.recv().await {
        let oracle = oracle.clone();
        let responses = responses.clone();
        tokio::spawn(async move {
            let job = tokio::spawn(async move { oracle.layout_graph(&graph, &options).await });
            let result = match job.await {
                Ok(result) => result,
                Err(e) => Err(SyncError::Layout(format!("layout task failed: {e}"))),
            };
            if responses.send(LayoutResponse { id, result }).await.is_err() {
                log::debug!("layout worker: dispatcher gone, response {id} dropped");
            }
        });
    }
    log::debug!("layout worker: request channel closed");
}

/// Caller side: hand each response to whoever waits on its id.
async fn dispatch(mut responses: mpsc::Receiver<LayoutResponse>, pending: Pending) {
    while let Some(LayoutResponse { id, result }) = responses.recv().await {
        let waiter = lock(&pending).remove(&id);
        match waiter {
            Some(tx) => {
                if tx.send(result).is_err() {
                    log::debug!("layout worker: caller for {id} went away");
                }
            }
            None => log::warn!("layout worker: response {id} has no waiting caller"),
        }
    }
    // Dropping the responders wakes every remaining caller with WorkerClosed.
    lock(&pending).clear();
}

#[async_trait]
impl LayoutOracle for LayoutWorker {
    fn anchor(&self) -> Anchor {
        self.anchor
    }

    async fn layout_graph(&self, graph: &LayoutGraph, options: &LayoutOptions) -> SyncResult<LayoutResult> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        let request = LayoutRequest {
            id,
            graph: graph.clone(),
            options: *options,
        };
        if self.requests.send(request).await.is_err() {
            lock(&self.pending).remove(&id);
            return Err(SyncError::WorkerClosed);
        }
        log::trace!("layout request {id} queued");
        rx.await.map_err(|_| SyncError::WorkerClosed)?
    }
}
