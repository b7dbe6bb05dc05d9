use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use tcp_sweep::error::{IncompleteReason, ScanError};
use tcp_sweep::ports;
use tcp_sweep::prober::TcpProber;
use tcp_sweep::report;
use tcp_sweep::scanner::{ScanConfig, Scanner, DEFAULT_SCAN_TIMEOUT};
use tcp_sweep::types::{Port, ScanReport};

/// tcp-sweep — bounded-concurrency TCP connect port scanner.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tcp-sweep",
    version,
    about = "Bounded-concurrency TCP connect port scanner. Prints one \"<port> open\" line per open port.",
    long_about = None
)]
struct Cli {
    /// Target host name or IP address (e.g. scanme.nmap.org).
    host: String,

    /// Inclusive port range `start-end`, or a single port.
    #[arg(long, default_value = "1-1024")]
    ports: String,

    /// Number of concurrent workers (max in-flight connect attempts).
    #[arg(long, default_value_t = 100)]
    workers: usize,

    /// Per-probe connect timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,

    /// Overall scan timeout in seconds; 0 disables it.
    #[arg(long = "scan-timeout-secs", default_value_t = DEFAULT_SCAN_TIMEOUT.as_secs())]
    scan_timeout_secs: u64,

    /// Rescan unresolved ports once if the scan ends incomplete.
    #[arg(long = "retry-incomplete", default_value_t = false)]
    retry_incomplete: bool,

    /// Write the report as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Fail fast on configuration before touching the network.
    let range = ports::parse_range_str(&cli.ports).context("invalid --ports")?;
    let config = ScanConfig {
        workers: cli.workers,
        scan_timeout: (cli.scan_timeout_secs > 0).then(|| Duration::from_secs(cli.scan_timeout_secs)),
    };
    config.validate().context("invalid --workers")?;

    info!("tcp-sweep configuration:");
    info!("  host         : {}", cli.host);
    info!("  ports        : {range}");
    info!("  workers      : {}", cli.workers);
    info!("  timeout_ms   : {}", cli.timeout_ms);
    info!("  scan_timeout : {:?}", config.scan_timeout);

    let prober = TcpProber::resolve(&cli.host, Duration::from_millis(cli.timeout_ms)).await?;
    let scanner = Scanner::new(prober, config)?;

    // Ctrl-C cancels the scan; whatever was confirmed is still printed.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let started_at = report::now_rfc3339();
    let start = Instant::now();

    let (open, unresolved) = match scanner.run_with_cancel(range, cancel.clone()).await {
        Ok(open) => (open, Vec::new()),
        Err(ScanError::IncompleteScan {
            reason,
            unresolved,
            open,
        }) => {
            warn!("{reason}: {} port(s) unresolved", unresolved.len());
            if cli.retry_incomplete && reason != IncompleteReason::Cancelled {
                retry(&scanner, open, &unresolved, cancel.clone()).await?
            } else {
                (open, unresolved)
            }
        }
        Err(e) => return Err(e.into()),
    };

    report::write_text(io::stdout().lock(), &open).context("failed to write results")?;

    if !unresolved.is_empty() {
        eprintln!(
            "warning: incomplete scan, {} port(s) unresolved: {}",
            unresolved.len(),
            summarize_ports(&unresolved)
        );
    }

    if let Some(path) = cli.output.as_deref() {
        let scan_report = ScanReport {
            host: cli.host.clone(),
            ports_total: range.len() as u64,
            open,
            complete: unresolved.is_empty(),
            unresolved,
            elapsed_ms: start.elapsed().as_millis() as u64,
            started_at,
        };
        report::write_report_json(path, &scan_report)?;
        info!("wrote JSON report to {}", path.display());
    }

    Ok(())
}

/// Rescan the unresolved ports once and merge with what was already confirmed.
async fn retry(
    scanner: &Scanner<TcpProber>,
    mut open: Vec<Port>,
    unresolved: &[Port],
    cancel: CancellationToken,
) -> Result<(Vec<Port>, Vec<Port>)> {
    info!("retrying {} unresolved port(s)", unresolved.len());
    let remaining = match scanner.run_ports(unresolved, cancel).await {
        Ok(more) => {
            open.extend(more);
            Vec::new()
        }
        Err(ScanError::IncompleteScan {
            unresolved, open: more, ..
        }) => {
            open.extend(more);
            unresolved
        }
        Err(e) => return Err(e.into()),
    };
    Ok((report::build(&open), remaining))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

// Keep the warning readable for large unresolved sets.
fn summarize_ports(ports: &[Port]) -> String {
    const SHOWN: usize = 20;
    let mut s = ports
        .iter()
        .take(SHOWN)
        .map(Port::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if ports.len() > SHOWN {
        s.push_str(&format!(", ... ({} more)", ports.len() - SHOWN));
    }
    s
}
