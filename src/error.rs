//! Error types surfaced by the sender and its builder.

use std::{io, sync::Arc, time::Duration};

use thiserror::Error;

/// Failure delivered to a completion or returned from a producer call.
///
/// The error is `Clone` because a single connection failure is reported to
/// every item drained while the sender is backing off. I/O sources are shared
/// rather than copied.
#[derive(Clone, Debug, Error)]
pub enum SenderError {
    /// Connecting did not finish within the configured timeout.
    #[error("connect to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: String, timeout: Duration },
    /// The transport refused or failed the connection attempt.
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: Arc<io::Error>,
    },
    /// Writing a payload to the connected socket failed.
    #[error("send failed: {0}")]
    Send(#[source] Arc<io::Error>),
    /// The sender was configured with an option this transport cannot honour.
    #[error("invalid sender configuration: {0}")]
    Configuration(String),
    /// A blocked enqueue was interrupted because the sender is closing.
    #[error("enqueue cancelled by sender shutdown")]
    Cancelled,
    /// The operating system refused to start the worker thread.
    #[error("failed to spawn sender worker: {0}")]
    WorkerSpawn(#[source] Arc<io::Error>),
}

impl SenderError {
    pub(crate) fn connect(endpoint: impl Into<String>, source: io::Error) -> Self {
        Self::Connect {
            endpoint: endpoint.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn send(source: io::Error) -> Self {
        Self::Send(Arc::new(source))
    }

    /// Whether the failure came from the network rather than configuration
    /// or shutdown.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. } | Self::Connect { .. } | Self::Send(_)
        )
    }
}

/// Errors that may occur while building a sender from user supplied values.
#[derive(Debug, Error)]
pub enum SenderBuildError {
    /// Invalid user supplied configuration.
    #[error("invalid sender configuration: {0}")]
    InvalidConfig(String),
}
