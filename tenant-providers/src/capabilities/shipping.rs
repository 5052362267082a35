//! Shipping-rate lookup.

use super::{Address, ApiAuth, RemoteApi};
use crate::types::Provider;
use async_trait::async_trait;
use commerce_common::PlatformError;
use reqwest::Client;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Default Shippo API endpoint.
pub const SHIPPO_API_BASE: &str = "https://api.goshippo.com";

/// Package dimensions and weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parcel {
    /// Weight in grams
    pub weight_grams: u32,
    /// Length in centimetres
    pub length_cm: u32,
    /// Width in centimetres
    pub width_cm: u32,
    /// Height in centimetres
    pub height_cm: u32,
}

/// Rate quote request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRequest {
    /// Origin
    pub from: Address,
    /// Destination
    pub to: Address,
    /// Packages in the shipment
    pub parcels: Vec<Parcel>,
}

/// One purchasable shipping option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRate {
    /// Carrier name
    pub carrier: String,
    /// Service level
    pub service: String,
    /// Price in minor currency units
    pub amount_minor: i64,
    /// ISO 4217 currency code
    pub currency: String,
    /// Carrier's transit estimate
    pub estimated_days: Option<u32>,
}

/// Quotes shipping rates for a tenant.
#[async_trait]
pub trait ShippingRateProvider: Send + Sync {
    /// Configured provider name.
    fn provider_name(&self) -> &'static str;

    /// Available rates, cheapest first.
    async fn quote_rates(
        &self,
        request: &ShipmentRequest,
    ) -> Result<Vec<ShippingRate>, PlatformError>;
}

/// A single fixed rate for every shipment.
#[derive(Debug, Clone)]
pub struct FlatRateShipping {
    rate: ShippingRate,
}

impl FlatRateShipping {
    /// Flat rate of `amount_minor` in `currency`.
    #[must_use]
    pub fn new(amount_minor: i64, currency: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            rate: ShippingRate {
                carrier: "flat_rate".to_string(),
                service: service.into(),
                amount_minor,
                currency: currency.into(),
                estimated_days: None,
            },
        }
    }
}

#[async_trait]
impl ShippingRateProvider for FlatRateShipping {
    fn provider_name(&self) -> &'static str {
        Provider::FlatRateShipping.name()
    }

    async fn quote_rates(
        &self,
        request: &ShipmentRequest,
    ) -> Result<Vec<ShippingRate>, PlatformError> {
        if request.parcels.is_empty() {
            return Err(PlatformError::invalid_input("shipment has no parcels"));
        }
        Ok(vec![self.rate.clone()])
    }
}

#[derive(Serialize)]
struct ShippoParcel {
    length: String,
    width: String,
    height: String,
    distance_unit: &'static str,
    weight: String,
    mass_unit: &'static str,
}

impl From<&Parcel> for ShippoParcel {
    fn from(p: &Parcel) -> Self {
        Self {
            length: p.length_cm.to_string(),
            width: p.width_cm.to_string(),
            height: p.height_cm.to_string(),
            distance_unit: "cm",
            weight: p.weight_grams.to_string(),
            mass_unit: "g",
        }
    }
}

#[derive(Serialize)]
struct ShippoShipmentRequest<'a> {
    address_from: &'a Address,
    address_to: &'a Address,
    parcels: Vec<ShippoParcel>,
    #[serde(rename = "async")]
    asynchronous: bool,
}

#[derive(Deserialize)]
struct ShippoServiceLevel {
    name: String,
}

#[derive(Deserialize)]
struct ShippoRate {
    provider: String,
    servicelevel: ShippoServiceLevel,
    amount: String,
    currency: String,
    estimated_days: Option<u32>,
}

#[derive(Deserialize)]
struct ShippoShipmentResponse {
    rates: Vec<ShippoRate>,
}

/// Parse a decimal amount such as `"12.5"` into minor units (`1250`).
fn parse_minor_units(amount: &str) -> Option<i64> {
    let amount = amount.trim();
    let (negative, digits) = amount
        .strip_prefix('-')
        .map_or((false, amount), |rest| (true, rest));
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    let is_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if whole.is_empty() || fraction.len() > 2 || !is_digits(whole) || !is_digits(fraction) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let cents: i64 = format!("{fraction:0<2}").parse().ok()?;
    let minor = whole.checked_mul(100)?.checked_add(cents)?;
    Some(if negative { -minor } else { minor })
}

/// Shippo multi-carrier rate client.
#[derive(Debug, Clone)]
pub struct ShippoShipping {
    api: RemoteApi,
}

impl ShippoShipping {
    /// Create a client.
    #[must_use]
    pub fn new(http: Client, api_key: SecretString, api_base: Option<&str>) -> Self {
        Self {
            api: RemoteApi::new(
                http,
                api_base.unwrap_or(SHIPPO_API_BASE),
                ApiAuth::Scheme {
                    scheme: "ShippoToken",
                    token: api_key,
                },
            ),
        }
    }
}

#[async_trait]
impl ShippingRateProvider for ShippoShipping {
    fn provider_name(&self) -> &'static str {
        Provider::Shippo.name()
    }

    #[instrument(
        skip(self, request),
        fields(endpoint = %self.api.base_url(), parcels = request.parcels.len())
    )]
    async fn quote_rates(
        &self,
        request: &ShipmentRequest,
    ) -> Result<Vec<ShippingRate>, PlatformError> {
        if request.parcels.is_empty() {
            return Err(PlatformError::invalid_input("shipment has no parcels"));
        }

        let body = ShippoShipmentRequest {
            address_from: &request.from,
            address_to: &request.to,
            parcels: request.parcels.iter().map(ShippoParcel::from).collect(),
            asynchronous: false,
        };
        let response: ShippoShipmentResponse = self.api.post_json("/shipments", &body).await?;

        let mut rates = response
            .rates
            .into_iter()
            .map(|r| {
                let amount_minor = parse_minor_units(&r.amount).ok_or_else(|| {
                    PlatformError::internal(format!("unparseable rate amount {:?}", r.amount))
                })?;
                Ok(ShippingRate {
                    carrier: r.provider,
                    service: r.servicelevel.name,
                    amount_minor,
                    currency: r.currency,
                    estimated_days: r.estimated_days,
                })
            })
            .collect::<Result<Vec<_>, PlatformError>>()?;
        rates.sort_by_key(|r| r.amount_minor);

        debug!(rates = rates.len(), "Shipping rates received");
        Ok(rates)
    }
}
