//! Tenant-scoped provider registry.
//!
//! Each capability has its own typed cache slot keyed by tenant. A cold or
//! expired key is loaded once no matter how many callers ask for it
//! concurrently: fetch the tenant's records, select one, decrypt, validate,
//! construct, cache for the configured TTL.
//!
//! [`Registry::invalidate_all_cache`] swaps in empty caches without cancelling
//! loads already in flight; such a load may still populate the new cache with
//! the configuration it read.

use crate::capabilities::{BillingProvider, EmailSender, ShippingRateProvider, TaxCalculator};
use crate::config::{ConfigError, RegistryConfig, load_encryption_key};
use crate::crypto::Encryptor;
use crate::error::{ErrorClass, ProviderError, RegistryError};
use crate::factory::ProviderFactory;
use crate::single_flight::SingleFlight;
use crate::store::{ConfigStore, StoreError, StoredProviderConfig};
use crate::types::{ProviderName, ProviderType, TenantId, TenantProviderConfig};
use arc_swap::ArcSwap;
use commerce_common::CacheMetrics;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

/// A constructed provider and when it stops being served.
struct CacheEntry<T: ?Sized> {
    provider: Arc<T>,
    provider_name: ProviderName,
    expires_at: Instant,
}

/// Cache and in-flight loads for one capability.
struct ProviderSlot<T: ?Sized + Send + Sync + 'static> {
    cache: ArcSwap<DashMap<TenantId, CacheEntry<T>>>,
    flights: SingleFlight<TenantId, Arc<T>, RegistryError>,
}

impl<T: ?Sized + Send + Sync + 'static> ProviderSlot<T> {
    fn new() -> Self {
        Self {
            cache: ArcSwap::from_pointee(DashMap::new()),
            flights: SingleFlight::new(),
        }
    }

    /// Live entry for `tenant_id`. An expired entry is evicted and treated as
    /// a miss.
    fn lookup(&self, tenant_id: &TenantId) -> Option<Arc<T>> {
        let cache = self.cache.load();
        let now = Instant::now();
        let found = cache
            .get(tenant_id)
            .map(|entry| (entry.expires_at > now).then(|| Arc::clone(&entry.provider)));

        match found {
            Some(Some(provider)) => Some(provider),
            Some(None) => {
                cache.remove_if(tenant_id, |_, entry| entry.expires_at <= now);
                None
            }
            None => None,
        }
    }

    fn store(&self, tenant_id: TenantId, entry: CacheEntry<T>) {
        let cache = self.cache.load();
        cache.insert(tenant_id, entry);
    }

    fn invalidate(&self, tenant_id: &TenantId) -> bool {
        let cache = self.cache.load();
        cache.remove(tenant_id).is_some()
    }

    fn clear(&self) {
        self.cache.store(Arc::new(DashMap::new()));
    }

    fn live_entries(&self) -> usize {
        let cache = self.cache.load();
        let now = Instant::now();
        cache.iter().filter(|entry| entry.expires_at > now).count()
    }

    fn cached_name(&self, tenant_id: &TenantId) -> Option<ProviderName> {
        let cache = self.cache.load();
        let now = Instant::now();
        cache
            .get(tenant_id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.provider_name.clone())
    }
}

/// Maps a capability marker to its handle type, provider type, cache slot and
/// factory constructor.
trait Capability: Send + Sync + 'static {
    type Handle: ?Sized + Send + Sync + 'static;

    const PROVIDER_TYPE: ProviderType;

    fn slot(inner: &RegistryInner) -> &ProviderSlot<Self::Handle>;

    fn create(
        factory: &ProviderFactory,
        config: &TenantProviderConfig,
    ) -> Result<Arc<Self::Handle>, ProviderError>;
}

enum Tax {}
enum Billing {}
enum Shipping {}
enum Email {}

impl Capability for Tax {
    type Handle = dyn TaxCalculator;
    const PROVIDER_TYPE: ProviderType = ProviderType::Tax;

    fn slot(inner: &RegistryInner) -> &ProviderSlot<Self::Handle> {
        &inner.tax
    }

    fn create(
        factory: &ProviderFactory,
        config: &TenantProviderConfig,
    ) -> Result<Arc<Self::Handle>, ProviderError> {
        factory.create_tax_calculator(config)
    }
}

impl Capability for Billing {
    type Handle = dyn BillingProvider;
    const PROVIDER_TYPE: ProviderType = ProviderType::Billing;

    fn slot(inner: &RegistryInner) -> &ProviderSlot<Self::Handle> {
        &inner.billing
    }

    fn create(
        factory: &ProviderFactory,
        config: &TenantProviderConfig,
    ) -> Result<Arc<Self::Handle>, ProviderError> {
        factory.create_billing_provider(config)
    }
}

impl Capability for Shipping {
    type Handle = dyn ShippingRateProvider;
    const PROVIDER_TYPE: ProviderType = ProviderType::Shipping;

    fn slot(inner: &RegistryInner) -> &ProviderSlot<Self::Handle> {
        &inner.shipping
    }

    fn create(
        factory: &ProviderFactory,
        config: &TenantProviderConfig,
    ) -> Result<Arc<Self::Handle>, ProviderError> {
        factory.create_shipping_provider(config)
    }
}

impl Capability for Email {
    type Handle = dyn EmailSender;
    const PROVIDER_TYPE: ProviderType = ProviderType::Email;

    fn slot(inner: &RegistryInner) -> &ProviderSlot<Self::Handle> {
        &inner.email
    }

    fn create(
        factory: &ProviderFactory,
        config: &TenantProviderConfig,
    ) -> Result<Arc<Self::Handle>, ProviderError> {
        factory.create_email_sender(config)
    }
}

/// Pick the record to use: the default one, otherwise the lowest priority,
/// ties broken by earliest creation then id. Inactive records are ignored.
#[must_use]
pub fn select_config(records: Vec<StoredProviderConfig>) -> Option<StoredProviderConfig> {
    records.into_iter().filter(|r| r.is_active).min_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.priority.cmp(&b.priority))
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    })
}

struct RegistryInner {
    config: RegistryConfig,
    store: Arc<dyn ConfigStore>,
    encryptor: Encryptor,
    factory: ProviderFactory,
    metrics: CacheMetrics,
    tax: ProviderSlot<dyn TaxCalculator>,
    billing: ProviderSlot<dyn BillingProvider>,
    shipping: ProviderSlot<dyn ShippingRateProvider>,
    email: ProviderSlot<dyn EmailSender>,
}

impl RegistryInner {
    async fn load<C: Capability>(
        self: Arc<Self>,
        tenant_id: TenantId,
    ) -> Result<Arc<C::Handle>, RegistryError> {
        let slot = C::slot(&self);
        if let Some(provider) = slot.lookup(&tenant_id) {
            return Ok(provider);
        }

        let result = self.build::<C>(&tenant_id).await;
        self.metrics.record_load(result.is_ok());

        match result {
            Ok((provider, provider_name)) => {
                let expires_at = Instant::now() + self.config.cache_ttl;
                info!(
                    provider_name = %provider_name,
                    ttl_secs = self.config.cache_ttl.as_secs(),
                    "Provider loaded"
                );
                slot.store(
                    tenant_id,
                    CacheEntry {
                        provider: Arc::clone(&provider),
                        provider_name,
                        expires_at,
                    },
                );
                Ok(provider)
            }
            Err(err) => {
                match err.class() {
                    ErrorClass::NotConfigured => debug!(error = %err, "No provider configured"),
                    ErrorClass::TransientInfrastructure => {
                        warn!(error = %err, "Provider load failed");
                    }
                    class => error!(class = ?class, error = %err, "Provider load failed"),
                }
                Err(err)
            }
        }
    }

    async fn build<C: Capability>(
        &self,
        tenant_id: &TenantId,
    ) -> Result<(Arc<C::Handle>, ProviderName), RegistryError> {
        let config = self.load_config(tenant_id, C::PROVIDER_TYPE).await?;
        let provider_name = config.provider_name.clone();
        let provider = C::create(&self.factory, &config).map_err(|e| {
            RegistryError::new(tenant_id.clone(), C::PROVIDER_TYPE, e)
                .with_provider_name(provider_name.clone())
        })?;
        Ok((provider, provider_name))
    }

    async fn load_config(
        &self,
        tenant_id: &TenantId,
        provider_type: ProviderType,
    ) -> Result<TenantProviderConfig, RegistryError> {
        let wrap = |e: ProviderError| RegistryError::new(tenant_id.clone(), provider_type, e);

        let fetch = self.store.list_active_configs(tenant_id, provider_type);
        let records = tokio::time::timeout(self.config.load_timeout, fetch)
            .await
            .map_err(|_| wrap(ProviderError::Timeout(self.config.load_timeout)))?
            .map_err(|e| match e {
                StoreError::Unsupported(provider_type) => {
                    wrap(ProviderError::NotImplemented { provider_type })
                }
                other => wrap(ProviderError::Store(other)),
            })?;

        let candidates = records.len();
        let selected = select_config(records)
            .ok_or_else(|| wrap(ProviderError::NotConfigured { provider_type }))?;
        let provider_name = selected.provider_name.clone();
        debug!(
            candidates,
            provider_name = %provider_name,
            record_id = %selected.id,
            "Provider config selected"
        );

        if selected.provider_type != provider_type {
            return Err(wrap(ProviderError::InvalidConfig {
                provider_type,
                provider_name: provider_name.clone(),
                errors: vec![format!(
                    "expected provider type {provider_type}, got {}",
                    selected.provider_type
                )],
            })
            .with_provider_name(provider_name));
        }

        let map = self
            .encryptor
            .decrypt_config(&selected.encrypted_config)
            .map_err(|e| wrap(e.into()).with_provider_name(provider_name))?;
        Ok(selected.into_config(map))
    }
}

/// Resolves tenant providers with caching and load coalescing.
///
/// Cloning is cheap and clones share the same caches.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Create a registry.
    #[must_use]
    pub fn new(
        config: RegistryConfig,
        store: Arc<dyn ConfigStore>,
        encryptor: Encryptor,
        factory: ProviderFactory,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                store,
                encryptor,
                factory,
                metrics: CacheMetrics::new("tenant_providers"),
                tax: ProviderSlot::new(),
                billing: ProviderSlot::new(),
                shipping: ProviderSlot::new(),
                email: ProviderSlot::new(),
            }),
        }
    }

    /// Build a registry from environment configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid settings, a missing key in production, or
    /// an HTTP client that cannot be built.
    pub fn from_env(store: Arc<dyn ConfigStore>) -> Result<Self, ConfigError> {
        let config = RegistryConfig::from_env()?;
        let key = load_encryption_key(config.environment)?;
        let factory = ProviderFactory::from_http_config(&config.http)
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        info!(
            environment = %config.environment,
            cache_ttl_secs = config.cache_ttl.as_secs(),
            load_timeout_secs = config.load_timeout.as_secs(),
            "Provider registry configured"
        );
        Ok(Self::new(config, store, Encryptor::from_key(&key), factory))
    }

    async fn get<C: Capability>(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Arc<C::Handle>, RegistryError> {
        let slot = C::slot(&self.inner);
        if let Some(provider) = slot.lookup(tenant_id) {
            self.inner.metrics.record_hit();
            return Ok(provider);
        }
        self.inner.metrics.record_miss();

        let inner = Arc::clone(&self.inner);
        let tenant = tenant_id.clone();
        let provider_type = C::PROVIDER_TYPE;
        let span = info_span!(
            "provider_load",
            tenant_id = %tenant_id,
            provider_type = %provider_type
        );
        let aborted_tenant = tenant_id.clone();
        slot.flights
            .run(
                tenant_id.clone(),
                move || inner.load::<C>(tenant).instrument(span),
                move || {
                    RegistryError::new(
                        aborted_tenant.clone(),
                        provider_type,
                        ProviderError::Aborted,
                    )
                },
            )
            .await
    }

    /// Tax calculator for `tenant_id`.
    ///
    /// # Errors
    ///
    /// See [`RegistryError::class`]: a tenant without an active tax provider
    /// gets [`ErrorClass::NotConfigured`].
    #[instrument(skip_all, fields(tenant_id = %tenant_id))]
    pub async fn get_tax_calculator(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Arc<dyn TaxCalculator>, RegistryError> {
        self.get::<Tax>(tenant_id).await
    }

    /// Billing provider for `tenant_id`.
    ///
    /// # Errors
    ///
    /// As for [`Registry::get_tax_calculator`].
    #[instrument(skip_all, fields(tenant_id = %tenant_id))]
    pub async fn get_billing_provider(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Arc<dyn BillingProvider>, RegistryError> {
        self.get::<Billing>(tenant_id).await
    }

    /// Shipping-rate provider for `tenant_id`.
    ///
    /// # Errors
    ///
    /// As for [`Registry::get_tax_calculator`].
    #[instrument(skip_all, fields(tenant_id = %tenant_id))]
    pub async fn get_shipping_provider(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Arc<dyn ShippingRateProvider>, RegistryError> {
        self.get::<Shipping>(tenant_id).await
    }

    /// Email sender for `tenant_id`.
    ///
    /// # Errors
    ///
    /// As for [`Registry::get_tax_calculator`].
    #[instrument(skip_all, fields(tenant_id = %tenant_id))]
    pub async fn get_email_sender(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Arc<dyn EmailSender>, RegistryError> {
        self.get::<Email>(tenant_id).await
    }

    /// Fetch, select and decrypt the configuration `tenant_id` would use for
    /// `provider_type`, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Store, selection and decryption failures as for the `get_*` methods.
    pub async fn load_config(
        &self,
        tenant_id: &TenantId,
        provider_type: ProviderType,
    ) -> Result<TenantProviderConfig, RegistryError> {
        self.inner.load_config(tenant_id, provider_type).await
    }

    /// Drop the cached provider for one (tenant, type). Returns whether an
    /// entry was removed.
    pub fn invalidate_cache(&self, tenant_id: &TenantId, provider_type: ProviderType) -> bool {
        let removed = match provider_type {
            ProviderType::Tax => self.inner.tax.invalidate(tenant_id),
            ProviderType::Billing => self.inner.billing.invalidate(tenant_id),
            ProviderType::Shipping => self.inner.shipping.invalidate(tenant_id),
            ProviderType::Email => self.inner.email.invalidate(tenant_id),
        };
        info!(
            tenant_id = %tenant_id,
            provider_type = %provider_type,
            removed,
            "Provider cache invalidated"
        );
        removed
    }

    /// Drop every cached provider for every tenant.
    pub fn invalidate_all_cache(&self) {
        self.inner.tax.clear();
        self.inner.billing.clear();
        self.inner.shipping.clear();
        self.inner.email.clear();
        info!("All provider caches invalidated");
    }

    /// Number of live cache entries for `provider_type`.
    #[must_use]
    pub fn cached_entries(&self, provider_type: ProviderType) -> usize {
        match provider_type {
            ProviderType::Tax => self.inner.tax.live_entries(),
            ProviderType::Billing => self.inner.billing.live_entries(),
            ProviderType::Shipping => self.inner.shipping.live_entries(),
            ProviderType::Email => self.inner.email.live_entries(),
        }
    }

    /// Name of the provider cached for (tenant, type), if any.
    #[must_use]
    pub fn cached_provider_name(
        &self,
        tenant_id: &TenantId,
        provider_type: ProviderType,
    ) -> Option<ProviderName> {
        match provider_type {
            ProviderType::Tax => self.inner.tax.cached_name(tenant_id),
            ProviderType::Billing => self.inner.billing.cached_name(tenant_id),
            ProviderType::Shipping => self.inner.shipping.cached_name(tenant_id),
            ProviderType::Email => self.inner.email.cached_name(tenant_id),
        }
    }

    /// Hit, miss and load counters.
    #[must_use]
    pub fn cache_metrics(&self) -> &CacheMetrics {
        &self.inner.metrics
    }

    /// Counters in Prometheus text format.
    #[must_use]
    pub fn metrics(&self) -> String {
        let size: usize = ProviderType::ALL
            .into_iter()
            .map(|t| self.cached_entries(t))
            .sum();
        self.inner.metrics.update_size(u64::try_from(size).unwrap_or(u64::MAX));
        self.inner.metrics.to_prometheus()
    }

    /// Active configuration used by this registry.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    fn record(priority: i32, is_default: bool, age_secs: i64) -> StoredProviderConfig {
        StoredProviderConfig {
            id: Uuid::new_v4(),
            tenant_id: TenantId::new("t1"),
            provider_type: ProviderType::Tax,
            provider_name: ProviderName::new("no_tax"),
            is_active: true,
            is_default,
            priority,
            encrypted_config: String::new(),
            created_at: Utc::now() - ChronoDuration::seconds(age_secs),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_select_prefers_default() {
        let default = record(10, true, 0);
        let id = default.id;
        let selected =
            select_config(vec![record(1, false, 0), default, record(2, false, 0)]).unwrap();
        assert_eq!(selected.id, id);
    }

    #[test]
    fn test_select_lowest_priority_without_default() {
        let best = record(-1, false, 0);
        let id = best.id;
        let selected =
            select_config(vec![record(3, false, 0), best, record(0, false, 0)]).unwrap();
        assert_eq!(selected.id, id);
    }

    #[test]
    fn test_select_priority_tie_prefers_oldest() {
        let oldest = record(1, false, 600);
        let id = oldest.id;
        let selected =
            select_config(vec![record(1, false, 10), oldest, record(1, false, 60)]).unwrap();
        assert_eq!(selected.id, id);
    }

    #[test]
    fn test_select_ignores_inactive() {
        let mut inactive_default = record(0, true, 0);
        inactive_default.is_active = false;
        let active = record(5, false, 0);
        let id = active.id;
        let selected = select_config(vec![inactive_default, active]).unwrap();
        assert_eq!(selected.id, id);

        let mut only = record(0, true, 0);
        only.is_active = false;
        assert!(select_config(vec![only]).is_none());
        assert!(select_config(Vec::new()).is_none());
    }

    #[test]
    fn test_lookup_evicts_expired_entry() {
        let slot: ProviderSlot<str> = ProviderSlot::new();
        let tenant = TenantId::new("t1");
        slot.store(
            tenant.clone(),
            CacheEntry {
                provider: Arc::from("expired"),
                provider_name: ProviderName::new("no_tax"),
                expires_at: Instant::now(),
            },
        );
        assert!(slot.lookup(&tenant).is_none());
        assert_eq!(slot.cache.load().len(), 0);
    }
}
