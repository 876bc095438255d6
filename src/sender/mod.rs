//! Ordered TCP sender.
//!
//! This module defines [`FemtoTcpSender`], which accepts byte payloads from any
//! thread and forwards them verbatim to a remote TCP endpoint. A single worker
//! thread owns the socket, connects lazily, and reports every item's outcome
//! through its completion. While the endpoint is unusable the worker backs off
//! using a fixed delay table and fails queued items instead of holding them.

mod backoff;
mod config;
mod handle;
mod queue;
mod transport;
mod worker;

#[cfg(test)]
mod test_support;

pub use backoff::{BackoffPolicy, DEFAULT_BACKOFF_MS};
pub use config::{
    AddressFamily, DEFAULT_CLOSE_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEPALIVE_INTERVAL,
    DEFAULT_QUEUE_CAPACITY, Endpoint, KeepaliveConfig, SecureTransport, SenderConfig,
};
pub use handle::FemtoTcpSender;
pub use queue::Completion;
pub use transport::{KeepaliveStatus, KeepaliveSupport};
pub use worker::WORKER_THREAD_NAME;
