//! Builder for [`FemtoTcpSender`](crate::FemtoTcpSender).
//!
//! Exposes endpoint selection, timeout tuning, keepalive, queue depth and the
//! backoff table. The builder also deserialises from configuration documents,
//! using the same field names as the `with_*` setters:
//!
//! ```
//! # use femtotcp::TcpSenderBuilder;
//! let builder: TcpSenderBuilder = serde_json::from_str(
//!     r#"{ "host": "logs.internal", "port": 5170, "capacity": 512,
//!          "backoff_ms": [50, 100, 250, 500, 1000] }"#,
//! ).expect("valid document");
//! let config = builder.build_config().expect("valid config");
//! assert_eq!(config.capacity, 512);
//! ```

use std::{sync::Arc, time::Duration};

use serde::Deserialize;

use crate::{
    error::SenderBuildError,
    sender::{
        AddressFamily, BackoffPolicy, Endpoint, FemtoTcpSender, KeepaliveSupport,
        SecureTransport, SenderConfig,
    },
};

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(SenderBuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Builder for constructing [`FemtoTcpSender`] instances.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TcpSenderBuilder {
    host: Option<String>,
    port: Option<u16>,
    address_family: Option<AddressFamily>,
    tls_domain: Option<String>,
    keepalive_idle_ms: Option<u64>,
    keepalive_interval_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    nodelay: Option<bool>,
    capacity: Option<usize>,
    backoff_ms: Option<Vec<u64>>,
    warn_interval_ms: Option<u64>,
    #[serde(skip)]
    keepalive_support: Option<Arc<KeepaliveSupport>>,
}

impl TcpSenderBuilder {
    /// Create a new builder with no endpoint configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Target `host:port`.
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    /// Request TLS with the given server name.
    ///
    /// The sender refuses to start with this set; see
    /// [`FemtoTcpSender::initialize`].
    pub fn with_tls(mut self, domain: impl Into<String>) -> Self {
        self.tls_domain = Some(domain.into());
        self
    }

    /// Replace the backoff table, in milliseconds.
    pub fn with_backoff_ms(mut self, delays: Vec<u64>) -> Self {
        self.backoff_ms = Some(delays);
        self
    }

    /// Use a private keepalive support cache instead of the process-wide one.
    pub fn with_keepalive_support(mut self, support: Arc<KeepaliveSupport>) -> Self {
        self.keepalive_support = Some(support);
        self
    }

    option_setter!(
        #[doc = "Restrict resolution to one address family."]
        with_address_family,
        address_family,
        AddressFamily
    );
    option_setter!(
        #[doc = "Enable keepalive with the given idle time. Zero disables it."]
        with_keepalive_idle_ms,
        keepalive_idle_ms,
        u64
    );
    option_setter!(with_keepalive_interval_ms, keepalive_interval_ms, u64);
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(with_write_timeout_ms, write_timeout_ms, u64);
    option_setter!(with_nodelay, nodelay, bool);
    option_setter!(
        #[doc = "Set the maximum queue depth."]
        with_capacity,
        capacity,
        usize
    );
    option_setter!(with_warn_interval_ms, warn_interval_ms, u64);

    fn validate(&self) -> Result<(), SenderBuildError> {
        self.validate_endpoint()?;
        if let Some(capacity) = self.capacity {
            ensure_positive!(capacity, "capacity")?;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        if let Some(timeout) = self.write_timeout_ms {
            ensure_positive!(timeout, "write_timeout_ms")?;
        }
        if let Some(interval) = self.keepalive_interval_ms {
            ensure_positive!(interval, "keepalive_interval_ms")?;
        }
        Ok(())
    }

    fn validate_endpoint(&self) -> Result<(), SenderBuildError> {
        match (&self.host, self.port) {
            (None, _) | (_, None) => Err(SenderBuildError::InvalidConfig(
                "sender requires a host and port".into(),
            )),
            (Some(host), _) if host.trim().is_empty() => Err(SenderBuildError::InvalidConfig(
                "host must not be empty".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Validate the builder and produce the sender configuration.
    pub fn build_config(&self) -> Result<SenderConfig, SenderBuildError> {
        self.validate()?;
        let (Some(host), Some(port)) = (self.host.as_deref(), self.port) else {
            return Err(SenderBuildError::InvalidConfig(
                "sender requires a host and port".into(),
            ));
        };
        let mut config = SenderConfig::new(Endpoint::new(host.trim(), port));
        self.apply_optional_fields(&mut config);
        if let Some(ref delays) = self.backoff_ms {
            config.backoff = BackoffPolicy::from_millis(delays).ok_or_else(|| {
                SenderBuildError::InvalidConfig(
                    "backoff_ms must be a non-empty, non-decreasing list".into(),
                )
            })?;
        }
        Ok(config)
    }

    fn apply_optional_fields(&self, config: &mut SenderConfig) {
        if let Some(family) = self.address_family {
            config.address_family = family;
        }
        if let Some(ref domain) = self.tls_domain {
            config.secure_transport = SecureTransport::Tls {
                domain: domain.clone(),
            };
        }
        if let Some(idle) = self.keepalive_idle_ms {
            config.keepalive.idle = Duration::from_millis(idle);
        }
        if let Some(interval) = self.keepalive_interval_ms {
            config.keepalive.interval = Duration::from_millis(interval);
        }
        if let Some(ref support) = self.keepalive_support {
            config.keepalive.support = Arc::clone(support);
        }
        if let Some(timeout) = self.connect_timeout_ms {
            config.connect_timeout = Duration::from_millis(timeout);
        }
        if let Some(timeout) = self.write_timeout_ms {
            config.write_timeout = Some(Duration::from_millis(timeout));
        }
        if let Some(nodelay) = self.nodelay {
            config.nodelay = nodelay;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(interval) = self.warn_interval_ms {
            config.warn_interval = Duration::from_millis(interval);
        }
    }

    /// Build the sender. The worker is not started until
    /// [`FemtoTcpSender::initialize`] or the first send.
    pub fn build(&self) -> Result<FemtoTcpSender, SenderBuildError> {
        Ok(FemtoTcpSender::new(self.build_config()?))
    }
}
