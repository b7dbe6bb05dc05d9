use std::collections::BTreeSet;

use crate::error::ConfigError;
use crate::types::{Port, ScanRange};

/// Parse a port range argument into a validated [`ScanRange`].
///
/// Supported formats:
/// - inclusive range: `1-1024`
/// - single port: `443` (a one-port range)
///
/// Surrounding whitespace is ignored.
pub fn parse_range_str(s: &str) -> Result<ScanRange, ConfigError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ConfigError::Parse("empty port range".into()));
    }

    if let Some((a, b)) = s.split_once('-') {
        let start = parse_port_num(a.trim())
            .map_err(|e| ConfigError::Parse(format!("invalid start in range {s}: {e}")))?;
        let end = parse_port_num(b.trim())
            .map_err(|e| ConfigError::Parse(format!("invalid end in range {s}: {e}")))?;
        return ScanRange::new(start, end);
    }

    let p = parse_port_num(s).map_err(|e| ConfigError::Parse(format!("invalid port {s}: {e}")))?;
    ScanRange::new(p, p)
}

/// Turn an arbitrary list of ports into a task list: ascending, deduplicated,
/// every entry in `1..=65535`.
///
/// Used to rescan just the unresolved ports of an incomplete scan.
pub fn task_list(ports: &[Port]) -> Result<Vec<Port>, ConfigError> {
    let mut seen = BTreeSet::new();
    for &p in ports {
        if p == 0 {
            return Err(ConfigError::InvalidPort(0));
        }
        seen.insert(p);
    }
    if seen.is_empty() {
        return Err(ConfigError::EmptyPortList);
    }
    Ok(seen.into_iter().collect())
}

// Parsed as u32 so that 0 and >65535 reach range validation instead of failing as overflow.
fn parse_port_num(s: &str) -> Result<u32, std::num::ParseIntError> {
    s.parse::<u32>()
}
