use std::sync::Arc;

use log::{debug, error, trace};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::ConfigError;
use crate::prober::Prober;
use crate::types::{Outcome, Port};

/// Default number of concurrent probes. Keeps the number of sockets in flight
/// well below typical descriptor and ephemeral port limits.
pub const DEFAULT_WORKERS: usize = 100;

/// Fixed-size set of workers pulling ports from a shared task channel.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::PoolSize(size));
        }
        Ok(Self { size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Start exactly `size` workers.
    ///
    /// Each port received on `tasks` is claimed by exactly one worker, probed,
    /// and its outcome sent on `outcomes`. Workers stop when `tasks` is closed and
    /// drained, when `outcomes` has no receiver, or when `cancel` fires. On
    /// cancellation an in-flight probe future is dropped, which closes its socket.
    pub fn spawn<P>(
        &self,
        tasks: mpsc::Receiver<Port>,
        prober: Arc<P>,
        outcomes: mpsc::Sender<Outcome>,
        cancel: CancellationToken,
    ) -> RunningPool
    where
        P: Prober + 'static,
    {
        let tasks = Arc::new(Mutex::new(tasks));
        let mut set = JoinSet::new();
        for id in 0..self.size {
            set.spawn(worker(
                id,
                tasks.clone(),
                prober.clone(),
                outcomes.clone(),
                cancel.clone(),
            ));
        }
        RunningPool { set }
    }
}

/// Handle to the spawned workers of one scan.
#[derive(Debug)]
pub struct RunningPool {
    set: JoinSet<()>,
}

impl RunningPool {
    /// Number of workers not yet joined.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Wait for every worker to finish. Returns how many workers panicked.
    pub async fn join(mut self) -> usize {
        let mut crashed = 0;
        while let Some(res) = self.set.join_next().await {
            if let Err(e) = res {
                error!("worker task failed: {e}");
                crashed += 1;
            }
        }
        crashed
    }
}

async fn worker<P: Prober>(
    id: usize,
    tasks: Arc<Mutex<mpsc::Receiver<Port>>>,
    prober: Arc<P>,
    outcomes: mpsc::Sender<Outcome>,
    cancel: CancellationToken,
) {
    trace!("worker {id} started");
    let mut probed = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            port = next_task(&tasks) => port,
        };
        let Some(port) = next else { break };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = prober.probe(port) => outcome,
        };
        probed += 1;

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            res = outcomes.send(outcome) => res,
        };
        if sent.is_err() {
            // Collector is gone; nothing left to report to.
            break;
        }
    }

    debug!("worker {id} stopped after {probed} probe(s)");
}

// The lock is held only while waiting for the next port, so each port reaches one worker.
async fn next_task(tasks: &Mutex<mpsc::Receiver<Port>>) -> Option<Port> {
    tasks.lock().await.recv().await
}
