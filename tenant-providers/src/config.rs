//! Registry configuration.
//!
//! All settings are loaded from environment variables (a `.env` file is
//! honoured) and validated at startup.

use crate::crypto::{CryptoError, EncryptionKey};
use commerce_common::HttpConfig;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use zeroize::Zeroizing;

/// Cache TTL in seconds; zero or negative selects the default.
pub const CACHE_TTL_VAR: &str = "PROVIDER_CACHE_TTL_SECS";
/// Store fetch timeout in seconds.
pub const LOAD_TIMEOUT_VAR: &str = "PROVIDER_LOAD_TIMEOUT_SECS";
/// Deployment environment.
pub const ENVIRONMENT_VAR: &str = "APP_ENV";
/// Base64-encoded 32-byte credential encryption key.
pub const ENCRYPTION_KEY_VAR: &str = "PROVIDER_ENCRYPTION_KEY";

/// Default cache TTL (one hour).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
/// Default store fetch timeout.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is present but unparseable
    #[error("invalid {name}: {reason}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// No encryption key in production
    #[error("PROVIDER_ENCRYPTION_KEY is required in production")]
    MissingEncryptionKey,

    /// Key present but unusable; the key text is never included
    #[error("PROVIDER_ENCRYPTION_KEY is invalid: {0}")]
    InvalidEncryptionKey(#[source] CryptoError),

    /// Outbound HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Live traffic
    Production,
    /// Pre-production
    Staging,
    /// Local development
    #[default]
    Development,
    /// Automated tests
    Test,
}

impl Environment {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
            Self::Test => "test",
        }
    }

    /// Whether this is production.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::Invalid {
                name: ENVIRONMENT_VAR,
                reason: format!("unknown environment {other:?}"),
            }),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a constructed provider stays cached
    pub cache_ttl: Duration,
    /// Upper bound on one configuration store fetch
    pub load_timeout: Duration,
    /// Deployment environment
    pub environment: Environment,
    /// Settings for the HTTP client shared by remote providers
    pub http: HttpConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            environment: Environment::default(),
            http: HttpConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let cache_ttl = normalize_ttl_secs(parse_var(&lookup, CACHE_TTL_VAR, 0i64)?);

        let load_timeout_secs =
            parse_var(&lookup, LOAD_TIMEOUT_VAR, DEFAULT_LOAD_TIMEOUT.as_secs())?;
        if load_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: LOAD_TIMEOUT_VAR,
                reason: "must be greater than 0".into(),
            });
        }

        let environment = lookup(ENVIRONMENT_VAR)
            .map(|v| v.parse::<Environment>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            cache_ttl,
            load_timeout: Duration::from_secs(load_timeout_secs),
            environment,
            http: HttpConfig::from_lookup(&lookup)
                .map_err(|(name, reason)| ConfigError::Invalid { name, reason })?,
        })
    }

    /// Set the cache TTL; zero selects the default.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = if ttl.is_zero() { DEFAULT_CACHE_TTL } else { ttl };
        self
    }

    /// Set the store fetch timeout.
    #[must_use]
    pub const fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    /// Set the environment.
    #[must_use]
    pub const fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Set HTTP client settings.
    #[must_use]
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }
}

/// Map a configured TTL in seconds to a duration; zero or negative selects
/// [`DEFAULT_CACHE_TTL`].
#[must_use]
pub fn normalize_ttl_secs(secs: i64) -> Duration {
    u64::try_from(secs)
        .ok()
        .filter(|s| *s > 0)
        .map_or(DEFAULT_CACHE_TTL, Duration::from_secs)
}

/// Load the credential encryption key from [`ENCRYPTION_KEY_VAR`].
///
/// # Errors
///
/// See [`encryption_key_from_lookup`].
pub fn load_encryption_key(environment: Environment) -> Result<EncryptionKey, ConfigError> {
    dotenvy::dotenv().ok();
    encryption_key_from_lookup(environment, |name| env::var(name).ok())
}

/// Load the credential encryption key through `lookup`.
///
/// Outside production a missing key is replaced with a random one and a
/// warning is logged: credentials stored under another key will not decrypt,
/// and credentials encrypted now will not survive a restart.
///
/// # Errors
///
/// [`ConfigError::MissingEncryptionKey`] in production when the variable is
/// unset or blank; [`ConfigError::InvalidEncryptionKey`] when it is not a
/// base64-encoded 32-byte key.
pub fn encryption_key_from_lookup(
    environment: Environment,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<EncryptionKey, ConfigError> {
    match lookup(ENCRYPTION_KEY_VAR).filter(|v| !v.trim().is_empty()) {
        Some(encoded) => {
            let encoded = Zeroizing::new(encoded);
            EncryptionKey::from_base64(&encoded).map_err(ConfigError::InvalidEncryptionKey)
        }
        None if environment.is_production() => Err(ConfigError::MissingEncryptionKey),
        None => {
            warn!(
                environment = %environment,
                "{ENCRYPTION_KEY_VAR} not set; using an ephemeral key. Previously stored \
                 provider credentials will not decrypt and credentials saved now will be \
                 unreadable after restart"
            );
            Ok(EncryptionKey::generate())
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
