//! Error types crossing the scanner/caller boundary.
//!
//! Per-port connect failures never appear here: they are absorbed by the
//! prober as [`Outcome::ClosedOrFiltered`](crate::types::Outcome).

use thiserror::Error;

use crate::types::Port;

/// Invalid setup detected before any probe is started.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid port range {start}-{end} (expected 1 <= start <= end <= 65535)")]
    InvalidRange { start: u32, end: u32 },

    #[error("invalid port: {0} (expected 1..=65535)")]
    InvalidPort(u32),

    #[error("worker pool size must be at least 1 (got {0})")]
    PoolSize(usize),

    #[error("no ports to scan")]
    EmptyPortList,

    #[error("could not resolve host {host}: {reason}")]
    UnresolvableHost { host: String, reason: String },

    #[error("parse error: {0}")]
    Parse(String),
}

/// Why collection stopped before every port was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompleteReason {
    TimedOut,
    Cancelled,
    WorkersExited,
}

impl std::fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IncompleteReason::TimedOut => "scan timeout elapsed",
            IncompleteReason::Cancelled => "scan cancelled",
            IncompleteReason::WorkersExited => "all workers exited early",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Some ports never produced an outcome. `open` holds what was confirmed anyway.
    #[error("incomplete scan ({reason}): {} port(s) unresolved", .unresolved.len())]
    IncompleteScan {
        reason: IncompleteReason,
        unresolved: Vec<Port>,
        open: Vec<Port>,
    },
}
