//! Provider factory.
//!
//! Turns a decrypted [`TenantProviderConfig`] into a live capability client.
//! Every `create_*` call revalidates first; on success only the fields the
//! provider needs are projected out of the untyped map.

use crate::capabilities::{
    BillingProvider, EmailSender, FlatRateShipping, NoTaxCalculator, PercentageTaxCalculator,
    RemoteTaxCalculator, SendGridSender, ShippingRateProvider, ShippoShipping, SmtpSender,
    StripeBilling, TaxCalculator,
};
use crate::error::ProviderError;
use crate::types::{ConfigMap, Provider, ProviderType, TenantProviderConfig};
use crate::validation::{self, ValidationResult, number_field, string_field};
use commerce_common::{HttpConfig, PlatformError, build_http_client};
use reqwest::Client;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::debug;

/// Service name used by flat-rate shipping when none is configured.
pub const DEFAULT_FLAT_RATE_SERVICE: &str = "Standard";

/// Builds capability clients from validated configuration.
///
/// Remote clients built by one factory share its connection pool.
#[derive(Debug, Clone)]
pub struct ProviderFactory {
    http: Client,
}

impl ProviderFactory {
    /// Create a factory around an existing HTTP client.
    #[must_use]
    pub const fn new(http: Client) -> Self {
        Self { http }
    }

    /// Create a factory with an HTTP client built from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_http_config(config: &HttpConfig) -> Result<Self, PlatformError> {
        Ok(Self::new(build_http_client(config)?))
    }

    /// Build a tax calculator.
    ///
    /// # Errors
    ///
    /// [`ProviderError::UnknownProvider`] for a name that is not a tax
    /// provider, [`ProviderError::InvalidConfig`] if validation fails.
    pub fn create_tax_calculator(
        &self,
        config: &TenantProviderConfig,
    ) -> Result<Arc<dyn TaxCalculator>, ProviderError> {
        let (provider, map) = prepare(ProviderType::Tax, config, validation::validate_tax_config)?;
        let fields = Fields { provider, map };

        let calculator: Arc<dyn TaxCalculator> = match provider {
            Provider::PercentageTax => {
                Arc::new(PercentageTaxCalculator::new(fields.number("rate")?))
            }
            Provider::NoTax => Arc::new(NoTaxCalculator),
            Provider::StripeTax => Arc::new(RemoteTaxCalculator::stripe_tax(
                self.http.clone(),
                fields.secret("api_key")?,
                fields.optional("api_base"),
            )),
            Provider::TaxJar => Arc::new(RemoteTaxCalculator::taxjar(
                self.http.clone(),
                fields.secret("api_key")?,
                fields.optional("api_base"),
            )),
            Provider::Avalara => Arc::new(RemoteTaxCalculator::avalara(
                self.http.clone(),
                fields.string("account_id")?.to_string(),
                fields.secret("license_key")?,
                fields.string("company_code")?.to_string(),
                fields.optional("api_base"),
            )),
            other => return Err(fields.wrong_type(other)),
        };
        Ok(calculator)
    }

    /// Build a billing provider.
    ///
    /// # Errors
    ///
    /// As for [`ProviderFactory::create_tax_calculator`].
    pub fn create_billing_provider(
        &self,
        config: &TenantProviderConfig,
    ) -> Result<Arc<dyn BillingProvider>, ProviderError> {
        let (provider, map) =
            prepare(ProviderType::Billing, config, validation::validate_billing_config)?;
        let fields = Fields { provider, map };

        let billing: Arc<dyn BillingProvider> = match provider {
            Provider::Stripe => Arc::new(StripeBilling::new(
                self.http.clone(),
                fields.secret("secret_key")?,
                fields.string("publishable_key")?.to_string(),
                fields.optional("webhook_secret").map(SecretString::from),
                fields.optional("api_base"),
            )),
            other => return Err(fields.wrong_type(other)),
        };
        Ok(billing)
    }

    /// Build a shipping-rate provider.
    ///
    /// # Errors
    ///
    /// As for [`ProviderFactory::create_tax_calculator`].
    pub fn create_shipping_provider(
        &self,
        config: &TenantProviderConfig,
    ) -> Result<Arc<dyn ShippingRateProvider>, ProviderError> {
        let (provider, map) =
            prepare(ProviderType::Shipping, config, validation::validate_shipping_config)?;
        let fields = Fields { provider, map };

        let shipping: Arc<dyn ShippingRateProvider> = match provider {
            Provider::FlatRateShipping => Arc::new(FlatRateShipping::new(
                fields.integer("amount_minor")?,
                fields.string("currency")?.to_uppercase(),
                fields
                    .optional("service_name")
                    .unwrap_or(DEFAULT_FLAT_RATE_SERVICE),
            )),
            Provider::Shippo => Arc::new(ShippoShipping::new(
                self.http.clone(),
                fields.secret("api_key")?,
                fields.optional("api_base"),
            )),
            other => return Err(fields.wrong_type(other)),
        };
        Ok(shipping)
    }

    /// Build an email sender.
    ///
    /// # Errors
    ///
    /// As for [`ProviderFactory::create_tax_calculator`], plus
    /// [`ProviderError::Construction`] if the SMTP transport cannot be built.
    pub fn create_email_sender(
        &self,
        config: &TenantProviderConfig,
    ) -> Result<Arc<dyn EmailSender>, ProviderError> {
        let (provider, map) =
            prepare(ProviderType::Email, config, validation::validate_email_config)?;
        let fields = Fields { provider, map };

        let sender: Arc<dyn EmailSender> = match provider {
            Provider::Smtp => {
                let port = u16::try_from(fields.integer("port")?)
                    .map_err(|e| fields.construction(format!("port: {e}")))?;
                let sender = SmtpSender::new(
                    fields.string("host")?,
                    port,
                    fields.string("username")?.to_string(),
                    &fields.secret("password")?,
                    fields.string("from_address")?,
                )
                .map_err(|e| fields.construction(e.to_string()))?;
                Arc::new(sender)
            }
            Provider::SendGrid => Arc::new(SendGridSender::new(
                self.http.clone(),
                fields.secret("api_key")?,
                fields.string("from_address")?.to_string(),
                fields.optional("api_base"),
            )),
            other => return Err(fields.wrong_type(other)),
        };
        Ok(sender)
    }
}

/// Resolve the provider and validate; yields the map only when valid.
fn prepare<'a>(
    expected: ProviderType,
    config: &'a TenantProviderConfig,
    validate: fn(&TenantProviderConfig) -> ValidationResult,
) -> Result<(Provider, &'a ConfigMap), ProviderError> {
    let provider = Provider::resolve(expected, &config.provider_name).ok_or_else(|| {
        ProviderError::UnknownProvider {
            provider_type: expected,
            provider_name: config.provider_name.clone(),
        }
    })?;

    let result = validate(config);
    if !result.is_valid() {
        return Err(ProviderError::InvalidConfig {
            provider_type: expected,
            provider_name: config.provider_name.clone(),
            errors: result.errors,
        });
    }

    let map = config.config.as_ref().ok_or_else(|| ProviderError::InvalidConfig {
        provider_type: expected,
        provider_name: config.provider_name.clone(),
        errors: vec!["config is required".to_string()],
    })?;

    debug!(
        tenant_id = %config.tenant_id,
        provider = %provider,
        "Constructing provider"
    );
    Ok((provider, map))
}

/// Typed reads from an already-validated map.
struct Fields<'a> {
    provider: Provider,
    map: &'a ConfigMap,
}

impl<'a> Fields<'a> {
    fn construction(&self, reason: impl Into<String>) -> ProviderError {
        ProviderError::construction(
            self.provider.provider_type(),
            &self.provider.into(),
            reason,
        )
    }

    fn missing(&self, field: &str) -> ProviderError {
        self.construction(format!("{field} missing after validation"))
    }

    fn wrong_type(&self, other: Provider) -> ProviderError {
        self.construction(format!("{other} is not handled by this factory method"))
    }

    fn string(&self, field: &str) -> Result<&'a str, ProviderError> {
        string_field(self.map, field).ok_or_else(|| self.missing(field))
    }

    fn optional(&self, field: &str) -> Option<&'a str> {
        string_field(self.map, field)
    }

    fn secret(&self, field: &str) -> Result<SecretString, ProviderError> {
        self.string(field).map(SecretString::from)
    }

    fn number(&self, field: &str) -> Result<f64, ProviderError> {
        number_field(self.map, field).ok_or_else(|| self.missing(field))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn integer(&self, field: &str) -> Result<i64, ProviderError> {
        // Validation has already required an integral value within range.
        self.number(field).map(|n| n as i64)
    }
}
