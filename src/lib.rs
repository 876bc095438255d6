//! Ordered, backpressured TCP transport for log records.
//!
//! [`FemtoTcpSender`] accepts byte payloads from any number of threads and
//! writes them, in acceptance order, to a single remote endpoint. Delivery
//! happens on one background worker that connects lazily, backs off after
//! failures and reports the outcome of every accepted item through a
//! completion callback.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use femtotcp::TcpSenderBuilder;
//!
//! let sender = TcpSenderBuilder::new()
//!     .with_endpoint("127.0.0.1", 5170)
//!     .with_keepalive_idle_ms(30_000)
//!     .build()
//!     .expect("valid configuration");
//! sender
//!     .send(b"hello\n".to_vec(), |result| {
//!         if let Err(err) = result {
//!             eprintln!("delivery failed: {err}");
//!         }
//!     })
//!     .expect("sender accepts input");
//! assert!(sender.close_blocking(Duration::from_secs(1)));
//! ```

mod builder;
mod error;
mod rate_limited_warner;
pub mod sender;

pub use builder::TcpSenderBuilder;
pub use error::{SenderBuildError, SenderError};
pub use rate_limited_warner::DEFAULT_WARN_INTERVAL;
pub use sender::{
    AddressFamily, BackoffPolicy, Completion, DEFAULT_BACKOFF_MS, DEFAULT_CLOSE_TIMEOUT,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_QUEUE_CAPACITY, Endpoint,
    FemtoTcpSender, KeepaliveConfig, KeepaliveStatus, KeepaliveSupport, SecureTransport,
    SenderConfig, WORKER_THREAD_NAME,
};
