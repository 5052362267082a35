//! Tax calculation.

use super::{Address, ApiAuth, RemoteApi};
use crate::types::Provider;
use async_trait::async_trait;
use commerce_common::PlatformError;
use reqwest::Client;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Default Stripe API endpoint.
pub const STRIPE_API_BASE: &str = "https://api.stripe.com";
/// Default TaxJar API endpoint.
pub const TAXJAR_API_BASE: &str = "https://api.taxjar.com";
/// Default Avalara AvaTax endpoint.
pub const AVALARA_API_BASE: &str = "https://rest.avatax.com";

/// One line of an order to be taxed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLineItem {
    /// Caller's line reference, echoed in the quote
    pub reference: String,
    /// Unit price in minor currency units
    pub amount_minor: i64,
    /// Units ordered
    pub quantity: u32,
    /// Product tax code, when the service supports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_code: Option<String>,
}

impl TaxLineItem {
    /// Taxable amount of the line.
    #[must_use]
    pub fn taxable_minor(&self) -> i64 {
        self.amount_minor.saturating_mul(i64::from(self.quantity))
    }
}

/// Tax quote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRequest {
    /// ISO 4217 currency code
    pub currency: String,
    /// Destination
    pub ship_to: Address,
    /// Lines to tax
    pub line_items: Vec<TaxLineItem>,
}

/// Tax computed for one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxLine {
    /// Line reference from the request
    pub reference: String,
    /// Amount tax was computed on
    pub taxable_minor: i64,
    /// Tax amount
    pub tax_minor: i64,
    /// Effective rate in percent
    pub rate: f64,
}

/// Result of a tax calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxQuote {
    /// Provider that produced the quote
    pub provider: String,
    /// ISO 4217 currency code
    pub currency: String,
    /// Per-line results
    pub lines: Vec<TaxLine>,
    /// Sum of line taxes
    pub total_tax_minor: i64,
}

/// Computes tax for an order.
#[async_trait]
pub trait TaxCalculator: Send + Sync {
    /// Configured provider name.
    fn provider_name(&self) -> &'static str;

    /// Quote tax for `request`.
    async fn calculate(&self, request: &TaxRequest) -> Result<TaxQuote, PlatformError>;
}

/// Fixed-rate tax computed locally.
#[derive(Debug, Clone)]
pub struct PercentageTaxCalculator {
    rate: f64,
}

impl PercentageTaxCalculator {
    /// Calculator charging `rate` percent (0 to 100).
    #[must_use]
    pub const fn new(rate: f64) -> Self {
        Self { rate }
    }

    /// Configured rate in percent.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn tax_for(&self, taxable_minor: i64) -> i64 {
        (taxable_minor as f64 * self.rate / 100.0).round() as i64
    }
}

#[async_trait]
impl TaxCalculator for PercentageTaxCalculator {
    fn provider_name(&self) -> &'static str {
        Provider::PercentageTax.name()
    }

    async fn calculate(&self, request: &TaxRequest) -> Result<TaxQuote, PlatformError> {
        let lines: Vec<TaxLine> = request
            .line_items
            .iter()
            .map(|item| {
                let taxable_minor = item.taxable_minor();
                TaxLine {
                    reference: item.reference.clone(),
                    taxable_minor,
                    tax_minor: self.tax_for(taxable_minor),
                    rate: self.rate,
                }
            })
            .collect();
        Ok(quote(self.provider_name(), &request.currency, lines))
    }
}

/// Calculator that never charges tax.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTaxCalculator;

#[async_trait]
impl TaxCalculator for NoTaxCalculator {
    fn provider_name(&self) -> &'static str {
        Provider::NoTax.name()
    }

    async fn calculate(&self, request: &TaxRequest) -> Result<TaxQuote, PlatformError> {
        let lines = request
            .line_items
            .iter()
            .map(|item| TaxLine {
                reference: item.reference.clone(),
                taxable_minor: item.taxable_minor(),
                tax_minor: 0,
                rate: 0.0,
            })
            .collect();
        Ok(quote(self.provider_name(), &request.currency, lines))
    }
}

fn quote(provider: &str, currency: &str, lines: Vec<TaxLine>) -> TaxQuote {
    let total_tax_minor = lines
        .iter()
        .fold(0_i64, |total, l| total.saturating_add(l.tax_minor));
    TaxQuote {
        provider: provider.to_string(),
        currency: currency.to_string(),
        lines,
        total_tax_minor,
    }
}

#[derive(Serialize)]
struct RemoteQuoteRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    company_code: Option<&'a str>,
    #[serde(flatten)]
    request: &'a TaxRequest,
}

#[derive(Deserialize)]
struct RemoteQuoteResponse {
    lines: Vec<TaxLine>,
    total_tax_minor: i64,
}

/// Tax calculated by an external service (Stripe Tax, TaxJar or Avalara).
///
/// All three speak the platform's JSON quote contract: the [`TaxRequest`] is
/// posted to the service's quote path and answered with per-line taxes.
#[derive(Debug, Clone)]
pub struct RemoteTaxCalculator {
    provider: Provider,
    path: &'static str,
    company_code: Option<String>,
    api: RemoteApi,
}

impl RemoteTaxCalculator {
    /// Stripe Tax client.
    #[must_use]
    pub fn stripe_tax(http: Client, api_key: SecretString, api_base: Option<&str>) -> Self {
        Self {
            provider: Provider::StripeTax,
            path: "/v1/tax/calculations",
            company_code: None,
            api: RemoteApi::new(
                http,
                api_base.unwrap_or(STRIPE_API_BASE),
                ApiAuth::Bearer(api_key),
            ),
        }
    }

    /// TaxJar client.
    #[must_use]
    pub fn taxjar(http: Client, api_key: SecretString, api_base: Option<&str>) -> Self {
        Self {
            provider: Provider::TaxJar,
            path: "/v2/taxes",
            company_code: None,
            api: RemoteApi::new(
                http,
                api_base.unwrap_or(TAXJAR_API_BASE),
                ApiAuth::Bearer(api_key),
            ),
        }
    }

    /// Avalara client authenticating with account id and license key.
    #[must_use]
    pub fn avalara(
        http: Client,
        account_id: String,
        license_key: SecretString,
        company_code: String,
        api_base: Option<&str>,
    ) -> Self {
        Self {
            provider: Provider::Avalara,
            path: "/api/v2/transactions/create",
            company_code: Some(company_code),
            api: RemoteApi::new(
                http,
                api_base.unwrap_or(AVALARA_API_BASE),
                ApiAuth::Basic {
                    username: account_id,
                    password: license_key,
                },
            ),
        }
    }
}

#[async_trait]
impl TaxCalculator for RemoteTaxCalculator {
    fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    #[instrument(
        skip(self, request),
        fields(
            provider = self.provider.name(),
            endpoint = %self.api.base_url(),
            lines = request.line_items.len()
        )
    )]
    async fn calculate(&self, request: &TaxRequest) -> Result<TaxQuote, PlatformError> {
        let body = RemoteQuoteRequest {
            company_code: self.company_code.as_deref(),
            request,
        };
        let response: RemoteQuoteResponse = self.api.post_json(self.path, &body).await?;

        if response.lines.len() != request.line_items.len() {
            return Err(PlatformError::internal(format!(
                "{} returned {} tax lines for {} line items",
                self.provider.name(),
                response.lines.len(),
                request.line_items.len()
            )));
        }

        debug!(total_tax_minor = response.total_tax_minor, "Tax quote received");
        Ok(TaxQuote {
            provider: self.provider.name().to_string(),
            currency: request.currency.clone(),
            lines: response.lines,
            total_tax_minor: response.total_tax_minor,
        })
    }
}
