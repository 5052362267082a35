//! Registry error types.
//!
//! [`ProviderError`] describes what went wrong in one layer (store, crypto,
//! validation, construction). [`RegistryError`] adds the tenant and provider
//! context every caller-facing error must carry. Both are `Clone` because a
//! single load outcome is shared by every caller waiting on it.

use crate::crypto::CryptoError;
use crate::store::StoreError;
use crate::types::{ProviderName, ProviderType, TenantId};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Broad category used by callers to choose a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Invalid or unusable configuration; needs an administrator
    Configuration,
    /// Tenant has no active provider of this type; apply a fallback
    NotConfigured,
    /// The configuration store cannot serve this provider type at all
    NotImplemented,
    /// Stored credentials could not be decrypted or authenticated
    Cryptographic,
    /// Store fetch failed or timed out; safe to retry
    TransientInfrastructure,
}

/// Failure in one stage of resolving a provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// No active configuration record exists
    #[error("no active {provider_type} provider configured")]
    NotConfigured {
        /// Requested type
        provider_type: ProviderType,
    },

    /// The store has no fetch implementation for this type
    #[error("configuration store does not support {provider_type} providers")]
    NotImplemented {
        /// Requested type
        provider_type: ProviderType,
    },

    /// Validation rejected the configuration
    #[error(
        "invalid {provider_type} provider configuration for {provider_name}: {}",
        .errors.join("; ")
    )]
    InvalidConfig {
        /// Declared type
        provider_type: ProviderType,
        /// Declared name
        provider_name: ProviderName,
        /// Every violation found
        errors: Vec<String>,
    },

    /// Name does not identify a provider of this type
    #[error("unknown {provider_type} provider: {provider_name}")]
    UnknownProvider {
        /// Requested type
        provider_type: ProviderType,
        /// Unrecognised name
        provider_name: ProviderName,
    },

    /// Client construction failed after validation passed
    #[error("failed to construct {provider_type} provider {provider_name}: {reason}")]
    Construction {
        /// Declared type
        provider_type: ProviderType,
        /// Declared name
        provider_name: ProviderName,
        /// What failed
        reason: String,
    },

    /// Decryption or payload decoding failed
    #[error("credential decryption failed: {0}")]
    Crypto(#[from] CryptoError),

    /// Store fetch failed
    #[error("configuration store error: {0}")]
    Store(#[from] StoreError),

    /// Store fetch exceeded the load timeout
    #[error("configuration store fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The background load panicked or its runtime shut down
    #[error("provider load aborted")]
    Aborted,
}

impl ProviderError {
    /// Category of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotConfigured { .. } => ErrorClass::NotConfigured,
            Self::NotImplemented { .. } | Self::Store(StoreError::Unsupported(_)) => {
                ErrorClass::NotImplemented
            }
            Self::InvalidConfig { .. }
            | Self::UnknownProvider { .. }
            | Self::Construction { .. }
            | Self::Crypto(CryptoError::MalformedPayload(_)) => ErrorClass::Configuration,
            Self::Crypto(_) => ErrorClass::Cryptographic,
            Self::Store(_) | Self::Timeout(_) | Self::Aborted => {
                ErrorClass::TransientInfrastructure
            }
        }
    }

    /// Create a construction error.
    #[must_use]
    pub fn construction(
        provider_type: ProviderType,
        provider_name: &ProviderName,
        reason: impl Into<String>,
    ) -> Self {
        Self::Construction {
            provider_type,
            provider_name: provider_name.clone(),
            reason: reason.into(),
        }
    }
}

/// Caller-facing error from [`Registry`](crate::Registry) lookups.
#[derive(Debug, Clone, Error)]
pub struct RegistryError {
    /// Tenant being resolved
    pub tenant_id: TenantId,
    /// Capability requested
    pub provider_type: ProviderType,
    /// Selected provider, once known
    pub provider_name: Option<ProviderName>,
    /// Underlying failure
    pub source: ProviderError,
}

impl RegistryError {
    /// Wrap a provider error with tenant context.
    #[must_use]
    pub const fn new(
        tenant_id: TenantId,
        provider_type: ProviderType,
        source: ProviderError,
    ) -> Self {
        Self {
            tenant_id,
            provider_type,
            provider_name: None,
            source,
        }
    }

    /// Attach the selected provider name.
    #[must_use]
    pub fn with_provider_name(mut self, name: ProviderName) -> Self {
        self.provider_name = Some(name);
        self
    }

    /// Category of the underlying failure.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        self.source.class()
    }

    /// Whether the tenant simply has no provider of this type.
    #[must_use]
    pub const fn is_not_configured(&self) -> bool {
        matches!(self.class(), ErrorClass::NotConfigured)
    }

    /// Check if error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::TransientInfrastructure)
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} provider for tenant {}", self.provider_type, self.tenant_id)?;
        if let Some(name) = &self.provider_name {
            write!(f, " ({name})")?;
        }
        write!(f, ": {}", self.source)
    }
}
