//! Tenant-scoped provider registry.
//!
//! Resolves, per tenant, the external-service integration (tax calculation,
//! billing, shipping rates, email delivery) to use for a request. Provider
//! credentials are stored encrypted; the registry decrypts, validates and
//! constructs a client once per (tenant, provider type), caches it for a TTL,
//! and coalesces concurrent cold loads for the same key into one.
//!
//! Consistency is bounded-staleness: configuration writers must call
//! [`Registry::invalidate_cache`] after changing a tenant's provider
//! configuration, otherwise the change becomes visible after at most one TTL.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod capabilities;
pub mod config;
pub mod crypto;
pub mod error;
pub mod factory;
pub mod registry;
pub mod single_flight;
pub mod store;
pub mod types;
pub mod validation;

pub use capabilities::{BillingProvider, EmailSender, ShippingRateProvider, TaxCalculator};
pub use config::{ConfigError, Environment, RegistryConfig};
pub use crypto::{CryptoError, EncryptionKey, Encryptor};
pub use error::{ErrorClass, ProviderError, RegistryError};
pub use factory::ProviderFactory;
pub use registry::Registry;
pub use store::{ConfigStore, InMemoryConfigStore, StoreError, StoredProviderConfig};
pub use types::{ConfigMap, Provider, ProviderName, ProviderType, TenantId, TenantProviderConfig};
pub use validation::{ValidationResult, validate_config};
