use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::collector::ResultCollector;
use crate::error::{ConfigError, ScanError};
use crate::pool::{WorkerPool, DEFAULT_WORKERS};
use crate::ports;
use crate::prober::Prober;
use crate::types::{Port, ScanRange};

/// Overall scan bound used by [`ScanConfig::default`].
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(60);

/// Scan-level settings. Per-probe timeouts belong to the prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    /// Number of concurrent workers (and in-flight probes).
    pub workers: usize,
    /// Overall bound on a scan; `None` waits for every outcome. A bound too large
    /// to represent as a deadline behaves like `None`.
    pub scan_timeout: Option<Duration>,
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        WorkerPool::new(self.workers).map(|_| ())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            scan_timeout: Some(DEFAULT_SCAN_TIMEOUT),
        }
    }
}

/// Runs scans: feeds ports to a bounded worker pool and collects one outcome per port.
///
/// - Task handoff uses a channel whose capacity equals the pool size, so a full
///   `1-65535` scan never queues more than a pool's worth of pending ports.
/// - The collector is the completion barrier; the scan ends when every
///   dispatched port has an outcome, the scan timeout passes, or the caller cancels.
/// - Every spawned task is joined before a run returns, on success and on error.
pub struct Scanner<P> {
    prober: Arc<P>,
    pool: WorkerPool,
    scan_timeout: Option<Duration>,
}

impl<P> std::fmt::Debug for Scanner<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("pool", &self.pool)
            .field("scan_timeout", &self.scan_timeout)
            .finish_non_exhaustive()
    }
}

impl<P: Prober + 'static> Scanner<P> {
    pub fn new(prober: P, config: ScanConfig) -> Result<Self, ConfigError> {
        Self::with_shared(Arc::new(prober), config)
    }

    /// Like [`Scanner::new`] for a prober the caller keeps a handle to.
    pub fn with_shared(prober: Arc<P>, config: ScanConfig) -> Result<Self, ConfigError> {
        let pool = WorkerPool::new(config.workers)?;
        Ok(Self {
            prober,
            pool,
            scan_timeout: config.scan_timeout,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// Scan every port in `range`. Returns the open ports ascending.
    pub async fn run(&self, range: ScanRange) -> Result<Vec<Port>, ScanError> {
        self.run_with_cancel(range, CancellationToken::new()).await
    }

    /// Validate raw bounds, then scan. Nothing is probed if the bounds are invalid.
    pub async fn run_bounds(&self, start: u32, end: u32) -> Result<Vec<Port>, ScanError> {
        let range = ScanRange::new(start, end)?;
        self.run(range).await
    }

    /// Scan `range`, stopping early with `IncompleteScan` if `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        range: ScanRange,
        cancel: CancellationToken,
    ) -> Result<Vec<Port>, ScanError> {
        info!(
            "scanning ports {range} ({} ports) with {} workers",
            range.len(),
            self.pool.size()
        );
        let collector = ResultCollector::new(range.ports());
        self.execute(range.ports(), collector, cancel).await
    }

    /// Scan an explicit port list, e.g. the unresolved ports of an earlier incomplete scan.
    pub async fn run_ports(
        &self,
        ports: &[Port],
        cancel: CancellationToken,
    ) -> Result<Vec<Port>, ScanError> {
        let tasks = ports::task_list(ports)?;
        info!(
            "scanning {} listed ports with {} workers",
            tasks.len(),
            self.pool.size()
        );
        let collector = ResultCollector::new(tasks.iter().copied());
        self.execute(tasks.into_iter(), collector, cancel).await
    }

    async fn execute<I>(
        &self,
        tasks: I,
        collector: ResultCollector,
        parent: CancellationToken,
    ) -> Result<Vec<Port>, ScanError>
    where
        I: Iterator<Item = Port> + Send + 'static,
    {
        let started = Instant::now();
        let cancel = parent.child_token();
        let deadline = self.scan_timeout.and_then(|t| started.checked_add(t));
        let capacity = self.pool.size();

        let (task_tx, task_rx) = mpsc::channel(capacity);
        let (outcome_tx, mut outcome_rx) = mpsc::channel(capacity);

        let pool = self
            .pool
            .spawn(task_rx, self.prober.clone(), outcome_tx, cancel.clone());
        let feeder = tokio::spawn(feed(tasks, task_tx, cancel.clone()));

        let result = collector.collect(&mut outcome_rx, deadline, &cancel).await;

        // Tear down regardless of how collection ended.
        cancel.cancel();
        drop(outcome_rx);
        match feeder.await {
            Ok(fed) => debug!("feeder dispatched {fed} port(s)"),
            Err(e) => warn!("feeder task failed: {e}"),
        }
        let crashed = pool.join().await;
        if crashed > 0 {
            warn!("{crashed} worker(s) crashed during the scan");
        }

        match &result {
            Ok(open) => info!(
                "scan finished in {:?}: {} open",
                started.elapsed(),
                open.len()
            ),
            Err(e) => warn!("scan ended after {:?}: {e}", started.elapsed()),
        }
        result
    }
}

/// Push ports into the bounded task channel. Blocks while workers are saturated.
async fn feed<I>(tasks: I, tx: mpsc::Sender<Port>, cancel: CancellationToken) -> usize
where
    I: Iterator<Item = Port>,
{
    let mut fed = 0;
    for port in tasks {
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            res = tx.send(port) => res,
        };
        if sent.is_err() {
            break;
        }
        fed += 1;
    }
    fed
}
