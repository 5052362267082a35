//! Configuration store boundary.
//!
//! The registry reads encrypted provider records through [`ConfigStore`].
//! Persistence lives elsewhere; [`InMemoryConfigStore`] backs development and
//! tests.

use crate::crypto::{CryptoError, Encryptor};
use crate::types::{ConfigMap, ProviderName, ProviderType, TenantId, TenantProviderConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

/// Errors from a configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store could not be reached; transient
    #[error("configuration store unavailable: {0}")]
    Unavailable(String),

    /// Store has no implementation for this provider type
    #[error("no configuration support for {0} providers")]
    Unsupported(ProviderType),

    /// Unexpected store failure
    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// A provider configuration record as persisted, credentials still sealed.
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredProviderConfig {
    /// Record identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Declared provider type
    pub provider_type: ProviderType,
    /// Declared provider name
    pub provider_name: ProviderName,
    /// Whether the record may be selected
    pub is_active: bool,
    /// Preferred record for its type
    pub is_default: bool,
    /// Lower value wins when no record is default
    pub priority: i32,
    /// `base64(nonce || ciphertext)` of the JSON configuration
    pub encrypted_config: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl StoredProviderConfig {
    /// Seal a decrypted configuration for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn seal(config: &TenantProviderConfig, encryptor: &Encryptor) -> Result<Self, CryptoError> {
        let encrypted_config = match &config.config {
            Some(map) => encryptor.encrypt_config(map)?,
            None => config.encrypted_config.clone(),
        };
        Ok(Self {
            id: config.id,
            tenant_id: config.tenant_id.clone(),
            provider_type: config.provider_type,
            provider_name: config.provider_name.clone(),
            is_active: config.is_active,
            is_default: config.is_default,
            priority: config.priority,
            encrypted_config,
            created_at: config.created_at,
            updated_at: config.updated_at,
        })
    }

    /// Attach decrypted configuration, producing the record the validator and
    /// factory work on.
    #[must_use]
    pub fn into_config(self, config: ConfigMap) -> TenantProviderConfig {
        TenantProviderConfig {
            id: self.id,
            tenant_id: self.tenant_id,
            provider_type: self.provider_type,
            provider_name: self.provider_name,
            is_active: self.is_active,
            is_default: self.is_default,
            priority: self.priority,
            config: Some(config),
            encrypted_config: self.encrypted_config,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Mark the record inactive.
    #[must_use]
    pub const fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }
}

impl fmt::Debug for StoredProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredProviderConfig")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("provider_type", &self.provider_type)
            .field("provider_name", &self.provider_name)
            .field("is_active", &self.is_active)
            .field("is_default", &self.is_default)
            .field("priority", &self.priority)
            .field("encrypted_config", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Source of encrypted provider configuration records.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Active records for `tenant_id` of `provider_type`, in no particular
    /// order.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unsupported`] when the store cannot serve the type,
    /// otherwise any fetch failure.
    async fn list_active_configs(
        &self,
        tenant_id: &TenantId,
        provider_type: ProviderType,
    ) -> Result<Vec<StoredProviderConfig>, StoreError>;
}

/// Thread-safe in-memory [`ConfigStore`].
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    records: RwLock<HashMap<TenantId, Vec<StoredProviderConfig>>>,
    unsupported: HashSet<ProviderType>,
}

impl InMemoryConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report [`StoreError::Unsupported`] for `provider_type`.
    #[must_use]
    pub fn without_support_for(mut self, provider_type: ProviderType) -> Self {
        self.unsupported.insert(provider_type);
        self
    }

    /// Insert or replace a record (matched by id).
    pub async fn insert(&self, record: StoredProviderConfig) {
        let mut records = self.records.write().await;
        let tenant = records.entry(record.tenant_id.clone()).or_default();
        tenant.retain(|r| r.id != record.id);
        tenant.push(record);
    }

    /// Remove a record. Returns whether it existed.
    pub async fn remove(&self, tenant_id: &TenantId, id: Uuid) -> bool {
        let mut records = self.records.write().await;
        let Some(tenant) = records.get_mut(tenant_id) else {
            return false;
        };
        let before = tenant.len();
        tenant.retain(|r| r.id != id);
        before != tenant.len()
    }

    /// Remove every record.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }

    /// Total number of records, active or not.
    pub async fn len(&self) -> usize {
        self.records.read().await.values().map(Vec::len).sum()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    #[instrument(skip_all, fields(tenant_id = %tenant_id, provider_type = %provider_type))]
    async fn list_active_configs(
        &self,
        tenant_id: &TenantId,
        provider_type: ProviderType,
    ) -> Result<Vec<StoredProviderConfig>, StoreError> {
        if self.unsupported.contains(&provider_type) {
            return Err(StoreError::Unsupported(provider_type));
        }

        let records = self.records.read().await;
        Ok(records
            .get(tenant_id)
            .map(|all| {
                all.iter()
                    .filter(|r| r.is_active && r.provider_type == provider_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
