use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use ::time::{format_description::well_known, OffsetDateTime};

use crate::types::{Port, ScanReport};

/// Sort open ports ascending. Pure and total over any input set.
pub fn build<'a>(open: impl IntoIterator<Item = &'a Port>) -> Vec<Port> {
    let mut ports: Vec<Port> = open.into_iter().copied().collect();
    ports.sort_unstable();
    ports.dedup();
    ports
}

/// One `"<port> open"` line per port, in the given order.
pub fn render_text(open: &[Port]) -> Vec<String> {
    open.iter().map(|p| format!("{p} open")).collect()
}

/// Write the text rendering, one line per open port.
pub fn write_text(mut out: impl Write, open: &[Port]) -> std::io::Result<()> {
    for line in render_text(open) {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

/// Write results as pretty JSON to `path`.
pub fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create report file: {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    Ok(())
}

/// Current UTC time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
