//! Payment processing.

use super::tax::STRIPE_API_BASE;
use super::{ApiAuth, RemoteApi};
use crate::types::Provider;
use async_trait::async_trait;
use commerce_common::PlatformError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// Request to start a payment.
#[derive(Debug, Clone, Default)]
pub struct PaymentIntentRequest {
    /// Amount in minor currency units; must be positive
    pub amount_minor: i64,
    /// ISO 4217 currency code
    pub currency: String,
    /// Receipt address
    pub receipt_email: Option<String>,
    /// Opaque key/value pairs stored with the payment
    pub metadata: BTreeMap<String, String>,
}

/// A payment awaiting confirmation by the customer.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    /// Processor identifier
    pub id: String,
    /// Secret the storefront uses to confirm the payment
    pub client_secret: SecretString,
    /// Processor status
    pub status: String,
    /// Amount in minor currency units
    #[serde(rename = "amount")]
    pub amount_minor: i64,
    /// ISO 4217 currency code
    pub currency: String,
}

/// Payment processor for a tenant.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Configured provider name.
    fn provider_name(&self) -> &'static str;

    /// Key the storefront embeds client-side.
    fn publishable_key(&self) -> &str;

    /// Whether the tenant is charging real money.
    fn is_live_mode(&self) -> bool;

    /// Create a payment intent.
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, PlatformError>;
}

/// Stripe payments client.
#[derive(Debug, Clone)]
pub struct StripeBilling {
    publishable_key: String,
    webhook_secret: Option<SecretString>,
    live_mode: bool,
    api: RemoteApi,
}

impl StripeBilling {
    /// Create a client. Live mode is derived from the secret key prefix.
    #[must_use]
    pub fn new(
        http: Client,
        secret_key: SecretString,
        publishable_key: String,
        webhook_secret: Option<SecretString>,
        api_base: Option<&str>,
    ) -> Self {
        let live_mode = secret_key.expose_secret().starts_with("sk_live_");
        Self {
            publishable_key,
            webhook_secret,
            live_mode,
            api: RemoteApi::new(
                http,
                api_base.unwrap_or(STRIPE_API_BASE),
                ApiAuth::Bearer(secret_key),
            ),
        }
    }

    /// Signing secret for verifying webhook payloads, when configured.
    #[must_use]
    pub const fn webhook_secret(&self) -> Option<&SecretString> {
        self.webhook_secret.as_ref()
    }
}

#[async_trait]
impl BillingProvider for StripeBilling {
    fn provider_name(&self) -> &'static str {
        Provider::Stripe.name()
    }

    fn publishable_key(&self) -> &str {
        &self.publishable_key
    }

    fn is_live_mode(&self) -> bool {
        self.live_mode
    }

    #[instrument(
        skip(self, request),
        fields(live_mode = self.live_mode, currency = %request.currency)
    )]
    async fn create_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, PlatformError> {
        if request.amount_minor <= 0 {
            return Err(PlatformError::invalid_input("amount must be positive"));
        }
        if request.currency.trim().is_empty() {
            return Err(PlatformError::invalid_input("currency is required"));
        }

        let metadata_keys: Vec<String> = request
            .metadata
            .keys()
            .map(|k| format!("metadata[{k}]"))
            .collect();
        let mut form = vec![
            ("amount", request.amount_minor.to_string()),
            ("currency", request.currency.to_lowercase()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];
        if let Some(email) = &request.receipt_email {
            form.push(("receipt_email", email.clone()));
        }
        for (key, value) in metadata_keys.iter().zip(request.metadata.values()) {
            form.push((key.as_str(), value.clone()));
        }

        let intent: PaymentIntent = self.api.post_form("/v1/payment_intents", &form).await?;
        info!(payment_intent_id = %intent.id, status = %intent.status, "Payment intent created");
        Ok(intent)
    }
}
