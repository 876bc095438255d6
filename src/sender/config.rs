//! Configuration structures consumed by the sender lifecycle.
//!
//! [`TcpSenderBuilder`](crate::TcpSenderBuilder) constructs these values before
//! passing them to [`FemtoTcpSender`](super::FemtoTcpSender). Everything here
//! is fixed once the sender exists.

use std::{
    fmt, io,
    net::{SocketAddr, ToSocketAddrs},
    sync::Arc,
    time::Duration,
};

use serde::Deserialize;

use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

use super::{backoff::BackoffPolicy, transport::KeepaliveSupport};

/// Default maximum number of queued work items.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
/// Default connection timeout applied when establishing sockets.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Bound on how long dropping a sender waits for its worker to stop.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Default keepalive probe interval used once keepalive is enabled.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Remote host and port the sender delivers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname or IP address to connect to.
    pub host: String,
    /// TCP port number.
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolve the endpoint, keeping only addresses of the requested family.
    pub(crate) fn resolve(&self, family: AddressFamily) -> io::Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .filter(|addr| family.admits(addr))
            .collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{self} has no {family} address"),
            ));
        }
        Ok(addrs)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Address family used when resolving the endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// Try every resolved address in resolver order.
    #[default]
    Any,
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    fn admits(self, addr: &SocketAddr) -> bool {
        match self {
            AddressFamily::Any => true,
            AddressFamily::Ipv4 => addr.is_ipv4(),
            AddressFamily::Ipv6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AddressFamily::Any => "any",
            AddressFamily::Ipv4 => "ipv4",
            AddressFamily::Ipv6 => "ipv6",
        })
    }
}

/// Secure transport selection.
///
/// Only [`SecureTransport::Disabled`] is supported. Any other value makes
/// [`FemtoTcpSender::initialize`](super::FemtoTcpSender::initialize) fail
/// rather than sending in clear text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SecureTransport {
    #[default]
    Disabled,
    /// TLS with the given server name.
    Tls { domain: String },
}

/// TCP keepalive tuning. A zero idle time leaves keepalive disabled.
#[derive(Clone, Debug)]
pub struct KeepaliveConfig {
    pub idle: Duration,
    pub interval: Duration,
    /// Cache recording whether detailed keepalive options are accepted.
    pub support: Arc<KeepaliveSupport>,
}

impl KeepaliveConfig {
    pub fn is_enabled(&self) -> bool {
        !self.idle.is_zero()
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            idle: Duration::ZERO,
            interval: DEFAULT_KEEPALIVE_INTERVAL,
            support: KeepaliveSupport::shared(),
        }
    }
}

/// Configuration object describing how to construct a
/// [`FemtoTcpSender`](super::FemtoTcpSender).
#[derive(Clone, Debug)]
pub struct SenderConfig {
    pub endpoint: Endpoint,
    pub address_family: AddressFamily,
    pub secure_transport: SecureTransport,
    pub keepalive: KeepaliveConfig,
    pub connect_timeout: Duration,
    /// Optional socket write timeout. `None` lets a stalled send block until
    /// the transport reports an error.
    pub write_timeout: Option<Duration>,
    pub nodelay: bool,
    pub capacity: usize,
    pub backoff: BackoffPolicy,
    pub warn_interval: Duration,
}

impl SenderConfig {
    /// Configuration targeting `endpoint` with default settings.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            address_family: AddressFamily::default(),
            secure_transport: SecureTransport::default(),
            keepalive: KeepaliveConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: None,
            nodelay: true,
            capacity: DEFAULT_QUEUE_CAPACITY,
            backoff: BackoffPolicy::default(),
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }

    /// Reject settings the transport cannot honour.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if let SecureTransport::Tls { .. } = self.secure_transport {
            return Err("secure transport is not supported; refusing to send in clear text".into());
        }
        if self.keepalive.is_enabled() && self.keepalive.interval.is_zero() {
            return Err("keepalive interval must be greater than zero".into());
        }
        if self.capacity == 0 {
            return Err("capacity must be greater than zero".into());
        }
        Ok(())
    }
}
