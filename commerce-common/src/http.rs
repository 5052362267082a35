//! Outbound HTTP client for remote provider APIs.
//!
//! Every remote tax, billing, shipping and email client built for any tenant
//! shares one [`reqwest::Client`] and therefore one connection pool.

use crate::error::PlatformError;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Environment variable overriding the per-request timeout, in seconds.
pub const HTTP_TIMEOUT_VAR: &str = "PROVIDER_HTTP_TIMEOUT_SECS";

/// Environment variable overriding the connect timeout, in seconds.
pub const HTTP_CONNECT_TIMEOUT_VAR: &str = "PROVIDER_HTTP_CONNECT_TIMEOUT_SECS";

/// Settings for the shared provider HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Whole-request deadline
    pub timeout: Duration,
    /// TCP and TLS handshake deadline
    pub connect_timeout: Duration,
    /// How long an idle pooled connection is kept
    pub pool_idle_timeout: Duration,
    /// Idle connections kept per provider host
    pub pool_max_idle_per_host: usize,
    /// `User-Agent` sent to providers
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 8,
            user_agent: concat!("commerce-platform/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    /// Defaults overridden by [`HTTP_TIMEOUT_VAR`] and
    /// [`HTTP_CONNECT_TIMEOUT_VAR`] when `lookup` returns them.
    ///
    /// # Errors
    ///
    /// Returns the offending variable name and reason when a value is not a
    /// positive integer.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, (&'static str, String)> {
        let mut config = Self::default();
        if let Some(secs) = positive_secs(&lookup, HTTP_TIMEOUT_VAR)? {
            config.timeout = secs;
        }
        if let Some(secs) = positive_secs(&lookup, HTTP_CONNECT_TIMEOUT_VAR)? {
            config.connect_timeout = secs;
        }
        Ok(config)
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set idle pool parameters.
    #[must_use]
    pub const fn with_pool_config(mut self, idle_timeout: Duration, max_idle: usize) -> Self {
        self.pool_idle_timeout = idle_timeout;
        self.pool_max_idle_per_host = max_idle;
        self
    }
}

fn positive_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<Duration>, (&'static str, String)> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err((name, "must be greater than 0".into())),
        Ok(secs) => Ok(Some(Duration::from_secs(secs))),
        Err(e) => Err((name, e.to_string())),
    }
}

/// Build the shared provider client: rustls, pooled, with the configured
/// deadlines.
///
/// # Errors
///
/// Returns [`PlatformError::Transport`] if the TLS backend cannot start.
///
/// # Examples
///
/// ```
/// use commerce_common::{HttpConfig, build_http_client};
/// use std::time::Duration;
///
/// let config = HttpConfig::default().with_timeout(Duration::from_secs(5));
/// assert!(build_http_client(&config).is_ok());
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, PlatformError> {
    Ok(ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .use_rustls_tls()
        .build()?)
}
