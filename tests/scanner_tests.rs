use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use tcp_sweep::error::{ConfigError, IncompleteReason, ScanError};
use tcp_sweep::prober::{Prober, TcpProber};
use tcp_sweep::report;
use tcp_sweep::scanner::{ScanConfig, Scanner};
use tcp_sweep::types::{Outcome, Port, ScanRange};

/// Reports `Open` for a fixed set and records every port it is asked about.
#[derive(Default)]
struct StubProber {
    open: HashSet<Port>,
    hang: HashSet<Port>,
    seen: Mutex<Vec<Port>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubProber {
    fn with_open(open: &[Port]) -> Self {
        Self {
            open: open.iter().copied().collect(),
            ..Default::default()
        }
    }

    fn seen(&self) -> Vec<Port> {
        self.seen.lock().unwrap().clone()
    }
}

/// Counts a probe as in flight until its future completes or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> (Self, usize) {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        (Self(counter), now)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Prober for StubProber {
    async fn probe(&self, port: Port) -> Outcome {
        self.seen.lock().unwrap().push(port);
        let (_guard, now) = InFlight::enter(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.hang.contains(&port) {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;

        if self.open.contains(&port) {
            Outcome::Open(port)
        } else {
            Outcome::ClosedOrFiltered(port)
        }
    }
}

fn config(workers: usize) -> ScanConfig {
    ScanConfig {
        workers,
        scan_timeout: Some(Duration::from_secs(30)),
    }
}

#[tokio::test]
async fn end_to_end_example() {
    let scanner = Scanner::new(StubProber::with_open(&[3, 7, 10]), config(4)).unwrap();
    let open = scanner.run(ScanRange::new(1, 10).unwrap()).await.unwrap();
    assert_eq!(open, vec![3, 7, 10]);
    assert_eq!(report::render_text(&open), vec!["3 open", "7 open", "10 open"]);
}

#[tokio::test]
async fn every_port_probed_exactly_once() {
    let prober = Arc::new(StubProber::with_open(&[]));
    let scanner = Scanner::with_shared(prober.clone(), config(16)).unwrap();
    scanner.run(ScanRange::new(100, 600).unwrap()).await.unwrap();

    let mut seen = prober.seen();
    assert_eq!(seen.len(), 501);
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen, (100..=600).collect::<Vec<Port>>());
}

#[tokio::test]
async fn pool_size_does_not_change_result() {
    let open = [2, 50, 99, 150, 151, 400];
    let range = ScanRange::new(1, 200).unwrap();
    let expected: Vec<Port> = vec![2, 50, 99, 150, 151];
    for workers in [1, 10, 100, 200] {
        let scanner = Scanner::new(StubProber::with_open(&open), config(workers)).unwrap();
        assert_eq!(scanner.run(range).await.unwrap(), expected, "workers={workers}");
    }
}

#[tokio::test]
async fn in_flight_probes_bounded_by_pool_size() {
    let prober = Arc::new(StubProber::with_open(&[]));
    let scanner = Scanner::with_shared(prober.clone(), config(8)).unwrap();
    scanner.run(ScanRange::new(1, 300).unwrap()).await.unwrap();
    let max = prober.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 8, "max in flight was {max}");
    assert!(max >= 1);
}

#[tokio::test]
async fn invalid_configuration_never_probes() {
    let prober = Arc::new(StubProber::with_open(&[1]));
    let scanner = Scanner::with_shared(prober.clone(), config(4)).unwrap();
    for (start, end) in [(0, 10), (20, 10), (1, 70000)] {
        let err = scanner.run_bounds(start, end).await.unwrap_err();
        assert!(matches!(
            err,
            ScanError::Config(ConfigError::InvalidRange { .. })
        ));
    }
    assert!(prober.seen().is_empty());

    let err = Scanner::new(StubProber::default(), config(0)).unwrap_err();
    assert_eq!(err, ConfigError::PoolSize(0));
}

#[tokio::test]
async fn hanging_probe_times_out_and_names_port() {
    let prober = Arc::new(StubProber {
        open: [2].into_iter().collect(),
        hang: [5].into_iter().collect(),
        ..Default::default()
    });
    let scanner = Scanner::with_shared(
        prober.clone(),
        ScanConfig {
            workers: 3,
            scan_timeout: Some(Duration::from_millis(300)),
        },
    )
    .unwrap();

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        scanner.run(ScanRange::new(1, 8).unwrap()),
    )
    .await
    .expect("scan must not hang past its timeout")
    .unwrap_err();

    match err {
        ScanError::IncompleteScan {
            reason,
            unresolved,
            open,
        } => {
            assert_eq!(reason, IncompleteReason::TimedOut);
            assert_eq!(unresolved, vec![5]);
            assert_eq!(open, vec![2]);
        }
        other => panic!("unexpected error: {other}"),
    }
    // The stuck probe was abandoned, not left running past the scan.
    assert_eq!(prober.in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(Arc::strong_count(&prober), 2);
}

#[tokio::test]
async fn external_cancel_stops_scan() {
    let prober = Arc::new(StubProber {
        hang: (1..=50).collect(),
        ..Default::default()
    });
    let scanner =
        Scanner::with_shared(prober.clone(), ScanConfig { workers: 5, scan_timeout: None }).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        scanner.run_with_cancel(ScanRange::new(1, 50).unwrap(), cancel),
    )
    .await
    .expect("cancel must end the scan")
    .unwrap_err();

    match err {
        ScanError::IncompleteScan {
            reason, unresolved, ..
        } => {
            assert_eq!(reason, IncompleteReason::Cancelled);
            assert_eq!(unresolved, (1..=50).collect::<Vec<Port>>());
        }
        other => panic!("unexpected error: {other}"),
    }
    // Five workers each held one hung probe; all were dropped and every worker joined.
    assert_eq!(prober.seen().len(), 5);
    assert_eq!(prober.in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(Arc::strong_count(&prober), 2);
}

/// Panics on one port, simulating a worker that dies without reporting.
struct PanicsOn(Port);

#[async_trait]
impl Prober for PanicsOn {
    async fn probe(&self, port: Port) -> Outcome {
        if port == self.0 {
            panic!("prober failure on port {port}");
        }
        if port % 3 == 0 {
            Outcome::Open(port)
        } else {
            Outcome::ClosedOrFiltered(port)
        }
    }
}

#[tokio::test]
async fn crashed_worker_leaves_its_port_unresolved() {
    let scanner = Scanner::new(PanicsOn(4), ScanConfig { workers: 3, scan_timeout: None }).unwrap();

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        scanner.run(ScanRange::new(1, 10).unwrap()),
    )
    .await
    .expect("a crashed worker must not hang the scan")
    .unwrap_err();

    match err {
        ScanError::IncompleteScan {
            reason,
            unresolved,
            open,
        } => {
            assert_eq!(reason, IncompleteReason::WorkersExited);
            assert_eq!(unresolved, vec![4]);
            assert_eq!(open, vec![3, 6, 9]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unresolved_ports_can_be_retried() {
    let hanging = StubProber {
        open: [4, 6].into_iter().collect(),
        hang: [6].into_iter().collect(),
        ..Default::default()
    };
    let scanner = Scanner::new(
        hanging,
        ScanConfig {
            workers: 2,
            scan_timeout: Some(Duration::from_millis(200)),
        },
    )
    .unwrap();
    let unresolved = match scanner.run(ScanRange::new(1, 6).unwrap()).await {
        Err(ScanError::IncompleteScan { unresolved, .. }) => unresolved,
        other => panic!("expected incomplete scan, got {other:?}"),
    };
    assert_eq!(unresolved, vec![6]);

    let healthy = Scanner::new(StubProber::with_open(&[4, 6]), config(2)).unwrap();
    let open = healthy
        .run_ports(&unresolved, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(open, vec![6]);
}

#[tokio::test]
async fn tcp_prober_against_loopback() {
    let l1 = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let l2 = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let p1 = l1.local_addr().unwrap().port();
    let p2 = l2.local_addr().unwrap().port();
    let closed = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };

    let prober = TcpProber::new(IpAddr::V4(Ipv4Addr::LOCALHOST), Duration::from_secs(2));
    let scanner = Scanner::new(prober, config(4)).unwrap();
    let mut ports = vec![p1, p2, closed];
    let open = scanner
        .run_ports(&ports, CancellationToken::new())
        .await
        .unwrap();

    ports.truncate(2);
    ports.sort_unstable();
    assert_eq!(open, ports);
}
