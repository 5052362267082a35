//! Provider data model.
//!
//! Provider types form a closed set. Provider names arrive as strings from
//! admin-edited, untyped configuration, so they stay string-backed at the
//! boundary and are resolved into the closed [`Provider`] enum explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Decrypted provider configuration: string keys, scalar JSON values.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// Category of external integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Tax calculation
    Tax,
    /// Payment processing
    Billing,
    /// Shipping-rate lookup
    Shipping,
    /// Email delivery
    Email,
}

impl ProviderType {
    /// All provider types.
    pub const ALL: [Self; 4] = [Self::Tax, Self::Billing, Self::Shipping, Self::Email];

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tax => "tax",
            Self::Billing => "billing",
            Self::Shipping => "shipping",
            Self::Email => "email",
        }
    }

    /// Providers registered under this type.
    pub fn providers(self) -> impl Iterator<Item = Provider> {
        Provider::ALL
            .into_iter()
            .filter(move |p| p.provider_type() == self)
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown provider type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown provider type: {0}")]
pub struct UnknownProviderType(pub String);

impl FromStr for ProviderType {
    type Err = UnknownProviderType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownProviderType(s.to_string()))
    }
}

/// Provider name as stored in configuration.
///
/// Any string is representable; whether it names a known provider of a given
/// type is answered by [`ProviderName::is_member_of`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderName(String);

impl ProviderName {
    /// Wrap a provider name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The raw name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this name identifies a known provider of `provider_type`.
    #[must_use]
    pub fn is_member_of(&self, provider_type: ProviderType) -> bool {
        Provider::resolve(provider_type, self).is_some()
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<Provider> for ProviderName {
    fn from(provider: Provider) -> Self {
        Self::new(provider.name())
    }
}

/// Every known (type, name) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Fixed percentage of each line amount
    PercentageTax,
    /// Always zero tax
    NoTax,
    /// Stripe Tax
    StripeTax,
    /// TaxJar
    TaxJar,
    /// Avalara AvaTax
    Avalara,
    /// Stripe payments
    Stripe,
    /// Single flat shipping rate
    FlatRateShipping,
    /// Shippo rate API
    Shippo,
    /// SMTP relay
    Smtp,
    /// SendGrid mail API
    SendGrid,
}

impl Provider {
    /// All known providers.
    pub const ALL: [Self; 10] = [
        Self::PercentageTax,
        Self::NoTax,
        Self::StripeTax,
        Self::TaxJar,
        Self::Avalara,
        Self::Stripe,
        Self::FlatRateShipping,
        Self::Shippo,
        Self::Smtp,
        Self::SendGrid,
    ];

    /// The type this provider belongs to.
    #[must_use]
    pub const fn provider_type(self) -> ProviderType {
        match self {
            Self::PercentageTax | Self::NoTax | Self::StripeTax | Self::TaxJar | Self::Avalara => {
                ProviderType::Tax
            }
            Self::Stripe => ProviderType::Billing,
            Self::FlatRateShipping | Self::Shippo => ProviderType::Shipping,
            Self::Smtp | Self::SendGrid => ProviderType::Email,
        }
    }

    /// Name used in stored configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PercentageTax => "percentage",
            Self::NoTax => "no_tax",
            Self::StripeTax => "stripe_tax",
            Self::TaxJar => "taxjar",
            Self::Avalara => "avalara",
            Self::Stripe => "stripe",
            Self::FlatRateShipping => "flat_rate",
            Self::Shippo => "shippo",
            Self::Smtp => "smtp",
            Self::SendGrid => "sendgrid",
        }
    }

    /// Resolve a stored (type, name) pair. `None` when the name is unknown or
    /// belongs to a different type.
    #[must_use]
    pub fn resolve(provider_type: ProviderType, name: &ProviderName) -> Option<Self> {
        provider_type
            .providers()
            .find(|p| p.name() == name.as_str())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider_type(), self.name())
    }
}

/// Tenant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Wrap a tenant identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A tenant's provider configuration with its credentials decrypted.
#[derive(Clone)]
pub struct TenantProviderConfig {
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
    /// Decrypted configuration; `None` until decrypted
    pub config: Option<ConfigMap>,
    /// Encrypted configuration as stored
    pub encrypted_config: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl TenantProviderConfig {
    /// Build an active, non-default record with priority 0 and the given
    /// decrypted configuration.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<TenantId>,
        provider_type: ProviderType,
        provider_name: impl Into<ProviderName>,
        config: ConfigMap,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            provider_type,
            provider_name: provider_name.into(),
            is_active: true,
            is_default: false,
            priority: 0,
            config: Some(config),
            encrypted_config: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark as the default record.
    #[must_use]
    pub const fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Resolve the declared (type, name) pair.
    #[must_use]
    pub fn provider(&self) -> Option<Provider> {
        Provider::resolve(self.provider_type, &self.provider_name)
    }
}

impl fmt::Debug for TenantProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Option<Vec<&String>> = self.config.as_ref().map(|c| c.keys().collect());
        f.debug_struct("TenantProviderConfig")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("provider_type", &self.provider_type)
            .field("provider_name", &self.provider_name)
            .field("is_active", &self.is_active)
            .field("is_default", &self.is_default)
            .field("priority", &self.priority)
            .field("config_keys", &keys)
            .field("encrypted_config", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}
