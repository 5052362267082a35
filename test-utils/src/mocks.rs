//! Mock implementations for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tenant_providers::{
    ConfigStore, InMemoryConfigStore, ProviderType, StoreError, StoredProviderConfig, TenantId,
};

/// Configuration store that counts fetches and can be slowed or failed.
#[derive(Debug, Default)]
pub struct CountingConfigStore {
    inner: InMemoryConfigStore,
    fetches: AtomicUsize,
    delay_ms: AtomicU64,
    failing: AtomicBool,
}

impl CountingConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing in-memory store.
    #[must_use]
    pub fn wrapping(inner: InMemoryConfigStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Create a shared store preloaded with `records`.
    pub async fn with_records(
        records: impl IntoIterator<Item = StoredProviderConfig>,
    ) -> Arc<Self> {
        let store = Self::new();
        for record in records {
            store.insert(record).await;
        }
        Arc::new(store)
    }

    /// Add or replace a record.
    pub async fn insert(&self, record: StoredProviderConfig) {
        self.inner.insert(record).await;
    }

    /// Remove every record.
    pub async fn clear(&self) {
        self.inner.clear().await;
    }

    /// Number of `list_active_configs` calls so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Delay every fetch by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Make fetches fail with [`StoreError::Unavailable`] until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConfigStore for CountingConfigStore {
    async fn list_active_configs(
        &self,
        tenant_id: &TenantId,
        provider_type: ProviderType,
    ) -> Result<Vec<StoredProviderConfig>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("injected failure"));
        }
        self.inner.list_active_configs(tenant_id, provider_type).await
    }
}

/// Store that returns every record it holds regardless of the requested
/// type, for exercising type-mismatch handling.
#[derive(Debug, Default)]
pub struct MislabelingConfigStore {
    records: Vec<StoredProviderConfig>,
}

impl MislabelingConfigStore {
    /// Create a store that always returns `records`.
    #[must_use]
    pub const fn new(records: Vec<StoredProviderConfig>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl ConfigStore for MislabelingConfigStore {
    async fn list_active_configs(
        &self,
        _tenant_id: &TenantId,
        _provider_type: ProviderType,
    ) -> Result<Vec<StoredProviderConfig>, StoreError> {
        Ok(self.records.clone())
    }
}
