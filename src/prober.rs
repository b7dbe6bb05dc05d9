use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use tokio::net::TcpStream;
use tokio::time;

use crate::error::ConfigError;
use crate::types::{Outcome, Port};

/// Capability invoked by workers to classify one port.
///
/// Implementations absorb every transport error and report it as
/// [`Outcome::ClosedOrFiltered`]; a probe never fails the scan. Dropping the
/// returned future must release any socket it holds.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, port: Port) -> Outcome;
}

#[async_trait]
impl<P: Prober + ?Sized> Prober for Arc<P> {
    async fn probe(&self, port: Port) -> Outcome {
        (**self).probe(port).await
    }
}

/// Plain TCP connect prober against a single resolved address.
///
/// A completed handshake is `Open` and the stream is closed right away.
/// Refusal, unreachability and the per-probe timeout all map to `ClosedOrFiltered`.
#[derive(Debug, Clone)]
pub struct TcpProber {
    ip: IpAddr,
    timeout: Duration,
}

impl TcpProber {
    pub fn new(ip: IpAddr, timeout: Duration) -> Self {
        Self { ip, timeout }
    }

    /// Resolve `host` (name or literal address) once, preferring IPv4.
    pub async fn resolve(host: &str, timeout: Duration) -> Result<Self, ConfigError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Self::new(ip, timeout));
        }

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| ConfigError::UnresolvableHost {
                host: host.to_string(),
                reason: e.to_string(),
            })?
            .collect();

        let ip = addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .map(SocketAddr::ip)
            .ok_or_else(|| ConfigError::UnresolvableHost {
                host: host.to_string(),
                reason: "no addresses returned".into(),
            })?;

        debug!("resolved {host} to {ip}");
        Ok(Self::new(ip, timeout))
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, port: Port) -> Outcome {
        let addr = SocketAddr::new(self.ip, port);
        match time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                Outcome::Open(port)
            }
            Ok(Err(e)) => {
                trace!("{addr}: {e}");
                Outcome::ClosedOrFiltered(port)
            }
            Err(_) => {
                trace!("{addr}: connect timed out");
                Outcome::ClosedOrFiltered(port)
            }
        }
    }
}
