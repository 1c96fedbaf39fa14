//! Store endpoint resolution.
//!
//! Container networks are often half-ready when a process starts: the
//! store's host name may not resolve yet even though the store accepts
//! connections, or resolve to an address that is not routable. The
//! [`Resolver`] works through the options in a fixed order:
//!
//! 1. an IPv4 literal host is used as-is (only probed);
//! 2. a direct TCP connect to `host:port`;
//! 3. an IPv4-preferring DNS lookup, verified with the same probe;
//! 4. once the retry budget is spent, each fallback candidate in order.
//!
//! Every probe socket is dropped as soon as the connect outcome is known,
//! so calling [`Resolver::resolve`] repeatedly never leaks connections.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use annotator_core::retry::{retry, RetryPolicy};
use tokio::net::TcpStream;

use crate::config::StoreConfig;
use crate::error::StoreError;

/// How an [`Endpoint`] was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMethod {
    /// The configured host was already an IPv4 literal.
    Literal,
    /// The host accepted a direct TCP connection by name.
    DirectProbe,
    /// DNS produced an address that accepted a connection.
    Dns,
    /// One of the fixed fallback candidates accepted a connection.
    Fallback,
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionMethod::Literal => "literal",
            ResolutionMethod::DirectProbe => "direct-probe",
            ResolutionMethod::Dns => "dns",
            ResolutionMethod::Fallback => "fallback-list",
        };
        f.write_str(name)
    }
}

/// A verified `(host, port)` pair. Recomputed on every (re)connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub method: ResolutionMethod,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (via {})", self.host, self.port, self.method)
    }
}

/// Resolves the logical store address to a reachable endpoint.
#[derive(Debug, Clone)]
pub struct Resolver {
    host: String,
    port: u16,
    probe_timeout: Duration,
    dns_timeout: Duration,
    fallback_hosts: Vec<String>,
}

impl Resolver {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let defaults = StoreConfig::default();
        Self {
            host: host.into(),
            port,
            probe_timeout: defaults.probe_timeout,
            dns_timeout: defaults.dns_timeout,
            fallback_hosts: defaults.fallback_hosts,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            probe_timeout: config.probe_timeout,
            dns_timeout: config.dns_timeout,
            fallback_hosts: config.fallback_hosts.clone(),
        }
    }

    pub fn with_fallback_hosts(mut self, hosts: Vec<String>) -> Self {
        self.fallback_hosts = hosts;
        self
    }

    pub fn with_timeouts(mut self, probe: Duration, dns: Duration) -> Self {
        self.probe_timeout = probe;
        self.dns_timeout = dns;
        self
    }

    /// Find a live endpoint or fail with [`StoreError::ConnectionUnavailable`].
    ///
    /// Direct probe and DNS are retried under `policy`; the fallback list
    /// is walked once after that budget is exhausted.
    pub async fn resolve(&self, policy: &RetryPolicy) -> Result<Endpoint, StoreError> {
        if let Ok(ip) = self.host.parse::<Ipv4Addr>() {
            return self.resolve_literal(ip, policy).await;
        }

        let by_name = retry(policy, "store endpoint resolution", |attempt| async move {
            self.resolve_by_name(attempt).await
        })
        .await;

        if let Ok(endpoint) = by_name {
            return Ok(endpoint);
        }

        if let Some(endpoint) = self.resolve_fallback().await {
            return Ok(endpoint);
        }

        tracing::error!(
            host = %self.host,
            port = self.port,
            attempts = policy.max_attempts,
            "All store endpoint candidates exhausted",
        );
        Err(self.unavailable(policy.max_attempts))
    }

    async fn resolve_literal(
        &self,
        ip: Ipv4Addr,
        policy: &RetryPolicy,
    ) -> Result<Endpoint, StoreError> {
        let addr = SocketAddr::new(IpAddr::V4(ip), self.port);
        retry(policy, "store literal probe", |_| async move {
            if probe_addr(addr, self.probe_timeout).await {
                Ok(Endpoint {
                    host: ip.to_string(),
                    port: self.port,
                    method: ResolutionMethod::Literal,
                })
            } else {
                Err(self.unavailable(1))
            }
        })
        .await
        .map_err(|_| self.unavailable(policy.max_attempts))
    }

    /// One attempt of steps 2 and 3.
    async fn resolve_by_name(&self, attempt: u32) -> Result<Endpoint, StoreError> {
        if probe_host(&self.host, self.port, self.probe_timeout).await {
            tracing::info!(host = %self.host, port = self.port, attempt, "Store reachable by name");
            return Ok(Endpoint {
                host: self.host.clone(),
                port: self.port,
                method: ResolutionMethod::DirectProbe,
            });
        }

        let Some(ip) = lookup_ipv4(&self.host, self.port, self.dns_timeout).await else {
            return Err(StoreError::Unavailable(format!(
                "could not resolve or reach {}:{}",
                self.host, self.port
            )));
        };

        tracing::info!(host = %self.host, %ip, attempt, "Resolved store host");
        if probe_addr(SocketAddr::new(ip, self.port), self.probe_timeout).await {
            Ok(Endpoint {
                host: ip.to_string(),
                port: self.port,
                method: ResolutionMethod::Dns,
            })
        } else {
            Err(StoreError::Unavailable(format!(
                "{} resolved to {ip} but {ip}:{} refused the connection",
                self.host, self.port
            )))
        }
    }

    /// Step 4: first fallback candidate that accepts a connection.
    async fn resolve_fallback(&self) -> Option<Endpoint> {
        for candidate in &self.fallback_hosts {
            tracing::debug!(candidate = %candidate, port = self.port, "Probing fallback store address");
            if probe_host(candidate, self.port, self.probe_timeout).await {
                tracing::warn!(
                    host = %self.host,
                    candidate = %candidate,
                    "Store host unresolvable, using fallback address",
                );
                return Some(Endpoint {
                    host: candidate.clone(),
                    port: self.port,
                    method: ResolutionMethod::Fallback,
                });
            }
        }
        None
    }

    fn unavailable(&self, attempts: u32) -> StoreError {
        StoreError::ConnectionUnavailable {
            host: self.host.clone(),
            port: self.port,
            attempts,
        }
    }
}

/// TCP-probe `host:port`, resolving the name as part of the connect.
pub async fn probe_host(host: &str, port: u16, timeout: Duration) -> bool {
    // The stream is dropped (closed) at the end of this expression.
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// TCP-probe a concrete socket address.
pub async fn probe_addr(addr: SocketAddr, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Resolve `host`, preferring an IPv4 address when both families answer.
pub async fn lookup_ipv4(host: &str, port: u16, timeout: Duration) -> Option<IpAddr> {
    let addrs: Vec<SocketAddr> =
        match tokio::time::timeout(timeout, tokio::net::lookup_host((host, port))).await {
            Ok(Ok(iter)) => iter.collect(),
            Ok(Err(e)) => {
                tracing::debug!(host, error = %e, "Name resolution failed");
                return None;
            }
            Err(_) => {
                tracing::debug!(host, timeout_ms = timeout.as_millis() as u64, "Name resolution timed out");
                return None;
            }
        };

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .map(|a| a.ip())
}
