use std::collections::{BTreeSet, HashSet};

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{IncompleteReason, ScanError};
use crate::report;
use crate::types::{Outcome, Port};

/// Single owner of the per-scan result state.
///
/// Knows which ports were dispatched and consumes outcomes until every one of
/// them is resolved. Arrival order carries no meaning.
#[derive(Debug)]
pub struct ResultCollector {
    pending: BTreeSet<Port>,
    open: HashSet<Port>,
    expected: usize,
}

impl ResultCollector {
    pub fn new(expected: impl IntoIterator<Item = Port>) -> Self {
        let pending: BTreeSet<Port> = expected.into_iter().collect();
        let expected = pending.len();
        Self {
            pending,
            open: HashSet::new(),
            expected,
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn resolved(&self) -> usize {
        self.expected - self.pending.len()
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Record one outcome. Returns `false` if the port was not pending
    /// (already resolved, or never dispatched); such outcomes are ignored.
    pub fn record(&mut self, outcome: Outcome) -> bool {
        let port = outcome.port();
        if !self.pending.remove(&port) {
            warn!("ignoring outcome for port {port}: not pending");
            return false;
        }
        if outcome.is_open() {
            debug!("port {port} open");
            self.open.insert(port);
        }
        true
    }

    /// Consume outcomes from `rx` until every dispatched port is resolved.
    ///
    /// Stops early with [`ScanError::IncompleteScan`] when `deadline` passes,
    /// `cancel` fires, or all senders are dropped while ports are still pending.
    /// On success the open ports are returned ascending.
    pub async fn collect(
        mut self,
        rx: &mut mpsc::Receiver<Outcome>,
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Port>, ScanError> {
        let step = (self.expected / 10).max(1);
        let mut next_mark = step;

        while !self.is_complete() {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.incomplete(IncompleteReason::Cancelled)),
                _ = sleep_until_opt(deadline) => return Err(self.incomplete(IncompleteReason::TimedOut)),
                o = rx.recv() => o,
            };

            let Some(outcome) = received else {
                return Err(self.incomplete(IncompleteReason::WorkersExited));
            };
            self.record(outcome);

            if self.resolved() >= next_mark {
                info!(
                    "progress: {}/{} ports resolved, {} open",
                    self.resolved(),
                    self.expected,
                    self.open.len()
                );
                next_mark += step;
            }
        }

        Ok(report::build(&self.open))
    }

    fn incomplete(self, reason: IncompleteReason) -> ScanError {
        let unresolved: Vec<Port> = self.pending.into_iter().collect();
        warn!(
            "collection stopped ({reason}) with {} of {} ports unresolved",
            unresolved.len(),
            self.expected
        );
        ScanError::IncompleteScan {
            reason,
            unresolved,
            open: report::build(&self.open),
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
