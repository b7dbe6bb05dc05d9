//! Library crate for tcp-sweep: a bounded-concurrency TCP connect port scanner.
//!
//! A [`Scanner`](scanner::Scanner) feeds the ports of a [`ScanRange`](types::ScanRange)
//! to a fixed-size [`WorkerPool`](pool::WorkerPool), which probes each port through a
//! [`Prober`](prober::Prober). A [`ResultCollector`](collector::ResultCollector) waits
//! for exactly one outcome per port and the open ports come back sorted ascending.
pub mod collector;
pub mod error;
pub mod pool;
pub mod ports;
pub mod prober;
pub mod report;
pub mod scanner;
pub mod types;
