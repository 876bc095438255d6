//! Socket primitives and connection management for the sender worker.

use std::{
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::{Duration, Instant},
};

use log::debug;
use once_cell::sync::Lazy;
use socket2::{Domain, Protocol, SockAddr, Socket, TcpKeepalive, Type};

use crate::error::SenderError;

use super::config::{AddressFamily, Endpoint, KeepaliveConfig, SenderConfig};

/// Opens and closes the connection used by the worker.
///
/// The worker owns the connector and every stream it returns; nothing else
/// touches the socket.
pub trait Connector: Send + 'static {
    type Stream: Write;

    /// Open a fresh connection.
    fn connect(&mut self) -> Result<Self::Stream, SenderError>;

    /// Gracefully shut down and release `stream`. Never fails.
    fn close(&mut self, stream: Self::Stream);
}

/// Whether the host accepts detailed keepalive tuning (idle time and probe
/// interval).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeepaliveStatus {
    Unknown,
    Supported,
    Unsupported,
}

const STATUS_UNKNOWN: u8 = 0;
const STATUS_SUPPORTED: u8 = 1;
const STATUS_UNSUPPORTED: u8 = 2;

static SHARED_KEEPALIVE_SUPPORT: Lazy<Arc<KeepaliveSupport>> =
    Lazy::new(|| Arc::new(KeepaliveSupport::new()));

/// Remembers whether detailed keepalive options were rejected, so later
/// connections stop retrying an option the host refuses.
///
/// Every sender shares [`KeepaliveSupport::shared`] unless configured with
/// its own instance.
#[derive(Debug, Default)]
pub struct KeepaliveSupport {
    status: AtomicU8,
}

impl KeepaliveSupport {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(STATUS_UNKNOWN),
        }
    }

    /// The process-wide instance.
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED_KEEPALIVE_SUPPORT)
    }

    pub fn status(&self) -> KeepaliveStatus {
        match self.status.load(Ordering::Acquire) {
            STATUS_SUPPORTED => KeepaliveStatus::Supported,
            STATUS_UNSUPPORTED => KeepaliveStatus::Unsupported,
            _ => KeepaliveStatus::Unknown,
        }
    }

    /// Forget what was learnt so the next connection probes again.
    pub fn reset(&self) {
        self.status.store(STATUS_UNKNOWN, Ordering::Release);
    }

    fn record(&self, status: KeepaliveStatus) {
        let raw = match status {
            KeepaliveStatus::Unknown => STATUS_UNKNOWN,
            KeepaliveStatus::Supported => STATUS_SUPPORTED,
            KeepaliveStatus::Unsupported => STATUS_UNSUPPORTED,
        };
        self.status.store(raw, Ordering::Release);
    }
}

fn keepalive_params(config: &KeepaliveConfig) -> TcpKeepalive {
    let params = TcpKeepalive::new().with_time(config.idle);
    #[cfg(any(
        target_os = "android",
        target_os = "freebsd",
        target_os = "ios",
        target_os = "linux",
        target_os = "macos",
        target_os = "netbsd",
        target_os = "windows",
    ))]
    let params = params.with_interval(config.interval);
    params
}

/// Enable keepalive on `socket`. Failures are logged and otherwise ignored.
fn configure_keepalive(socket: &Socket, config: &KeepaliveConfig) {
    if !config.is_enabled() {
        return;
    }
    if config.support.status() != KeepaliveStatus::Unsupported {
        match socket.set_tcp_keepalive(&keepalive_params(config)) {
            Ok(()) => {
                config.support.record(KeepaliveStatus::Supported);
                return;
            }
            Err(err) => {
                debug!("FemtoTcpSender keepalive tuning rejected: {err}");
                config.support.record(KeepaliveStatus::Unsupported);
            }
        }
    }
    if let Err(err) = socket.set_keepalive(true) {
        debug!("FemtoTcpSender failed to enable keepalive: {err}");
    }
}

/// Plain TCP connector driven by [`SenderConfig`].
pub struct TcpConnector {
    endpoint: Endpoint,
    family: AddressFamily,
    connect_timeout: Duration,
    write_timeout: Option<Duration>,
    nodelay: bool,
    keepalive: KeepaliveConfig,
}

impl From<&SenderConfig> for TcpConnector {
    fn from(config: &SenderConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            family: config.address_family,
            connect_timeout: config.connect_timeout,
            write_timeout: config.write_timeout,
            nodelay: config.nodelay,
            keepalive: config.keepalive.clone(),
        }
    }
}

impl TcpConnector {
    fn connect_addr(&self, addr: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        configure_keepalive(&socket, &self.keepalive);
        // On error the socket is dropped here, closing the half-open descriptor.
        socket.connect_timeout(&SockAddr::from(addr), timeout)?;
        let stream = TcpStream::from(socket);
        if self.nodelay
            && let Err(err) = stream.set_nodelay(true)
        {
            debug!("FemtoTcpSender failed to set TCP_NODELAY: {err}");
        }
        stream.set_write_timeout(self.write_timeout)?;
        Ok(stream)
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&mut self) -> Result<TcpStream, SenderError> {
        let endpoint = self.endpoint.to_string();
        let addrs = self
            .endpoint
            .resolve(self.family)
            .map_err(|err| SenderError::connect(endpoint.as_str(), err))?;
        let deadline = Instant::now() + self.connect_timeout;
        let mut last_err = None;
        for addr in addrs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.connect_addr(addr, remaining) {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    debug!("FemtoTcpSender connect to {addr} failed: {err}");
                    last_err = Some(err);
                }
            }
        }
        match last_err {
            Some(err) if err.kind() != io::ErrorKind::TimedOut => {
                Err(SenderError::connect(endpoint, err))
            }
            _ => Err(SenderError::ConnectTimeout {
                endpoint,
                timeout: self.connect_timeout,
            }),
        }
    }

    fn close(&mut self, stream: TcpStream) {
        if let Err(err) = stream.shutdown(Shutdown::Both) {
            debug!("FemtoTcpSender shutdown error ignored: {err}");
        }
    }
}

/// Write every byte of `payload`, re-issuing partial writes from the new
/// offset. A write that accepts nothing is treated as a failed send.
pub fn write_payload<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let mut offset = 0;
    while offset < payload.len() {
        match writer.write(&payload[offset..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "socket accepted zero bytes",
                ));
            }
            Ok(n) => offset += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    writer.flush()
}
