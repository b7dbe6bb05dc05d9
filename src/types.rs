use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

use crate::error::ConfigError;

/// A TCP port number. Valid scan targets are `1..=65535`.
pub type Port = u16;

/// Classification of a single probe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(tag = "state", content = "port", rename_all = "snake_case")]
pub enum Outcome {
    Open(Port),
    ClosedOrFiltered(Port),
}

impl Outcome {
    pub fn port(&self) -> Port {
        match *self {
            Outcome::Open(p) | Outcome::ClosedOrFiltered(p) => p,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Outcome::Open(_))
    }
}

/// Closed interval `[start, end]` of ports to probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    start: Port,
    end: Port,
}

impl ScanRange {
    /// Validate `1 <= start <= end <= 65535`.
    ///
    /// Bounds are taken as `u32` so out-of-range input such as `0` or `70000`
    /// is rejected here rather than silently truncated by the caller.
    pub fn new(start: u32, end: u32) -> Result<Self, ConfigError> {
        if start == 0 || end > u32::from(Port::MAX) || start > end {
            return Err(ConfigError::InvalidRange { start, end });
        }
        Ok(Self {
            start: start as Port,
            end: end as Port,
        })
    }

    /// The full `1-65535` range.
    pub fn full() -> Self {
        Self {
            start: 1,
            end: Port::MAX,
        }
    }

    pub fn start(&self) -> Port {
        self.start
    }

    pub fn end(&self) -> Port {
        self.end
    }

    /// Number of ports in the range, i.e. the number of outcomes a scan must observe.
    pub fn len(&self) -> usize {
        usize::from(self.end) - usize::from(self.start) + 1
    }

    /// A range always holds at least one port.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, port: Port) -> bool {
        (self.start..=self.end).contains(&port)
    }

    /// Fresh ascending, lazy enumeration of every port in the range.
    pub fn ports(&self) -> RangeInclusive<Port> {
        self.start..=self.end
    }
}

impl std::fmt::Display for ScanRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Final, serialisable record of one scan run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub host: String,
    pub ports_total: u64,
    pub open: Vec<Port>,
    pub unresolved: Vec<Port>,
    pub complete: bool,
    pub elapsed_ms: u64,
    pub started_at: String,
}
