//! Capability traits handed out by the registry, and their concrete clients.
//!
//! Callers depend only on the traits. Clients hold typed settings projected
//! from validated configuration; credentials stay in [`SecretString`] and are
//! exposed only when building an outgoing request.

pub mod billing;
pub mod email;
pub mod shipping;
pub mod tax;

pub use billing::{BillingProvider, PaymentIntent, PaymentIntentRequest, StripeBilling};
pub use email::{EmailMessage, EmailSender, SendGridSender, SmtpSender};
pub use shipping::{
    FlatRateShipping, Parcel, ShipmentRequest, ShippingRate, ShippingRateProvider,
    ShippoShipping,
};
pub use tax::{
    NoTaxCalculator, PercentageTaxCalculator, RemoteTaxCalculator, TaxCalculator, TaxLine,
    TaxLineItem, TaxQuote, TaxRequest,
};

use commerce_common::PlatformError;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Postal address used by tax and shipping requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// ISO 3166-1 alpha-2 country code
    pub country: String,
    /// Postal or ZIP code
    pub postal_code: String,
    /// State, province or region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// City
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Street line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
}

impl Address {
    /// Address with only country and postal code.
    #[must_use]
    pub fn new(country: impl Into<String>, postal_code: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            postal_code: postal_code.into(),
            state: None,
            city: None,
            line1: None,
        }
    }
}

/// Credentials attached to outgoing requests.
#[derive(Debug, Clone)]
pub(crate) enum ApiAuth {
    Bearer(SecretString),
    Basic {
        username: String,
        password: SecretString,
    },
    Scheme {
        scheme: &'static str,
        token: SecretString,
    },
}

/// Base URL, credentials and shared connection pool for one remote service.
#[derive(Debug, Clone)]
pub(crate) struct RemoteApi {
    http: Client,
    base_url: String,
    auth: ApiAuth,
}

impl RemoteApi {
    pub(crate) fn new(http: Client, base_url: &str, auth: ApiAuth) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self.http.post(format!("{}{path}", self.base_url));
        match &self.auth {
            ApiAuth::Bearer(token) => request.bearer_auth(token.expose_secret()),
            ApiAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password.expose_secret()))
            }
            ApiAuth::Scheme { scheme, token } => request.header(
                AUTHORIZATION,
                format!("{scheme} {}", token.expose_secret()),
            ),
        }
    }

    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, PlatformError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = send(self.post(path).json(body)).await?;
        Ok(response.json().await?)
    }

    pub(crate) async fn post_json_accepted<B>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), PlatformError>
    where
        B: Serialize + Sync + ?Sized,
    {
        send(self.post(path).json(body)).await.map(drop)
    }

    pub(crate) async fn post_form<T>(
        &self,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<T, PlatformError>
    where
        T: DeserializeOwned,
    {
        let response = send(self.post(path).form(form)).await?;
        Ok(response.json().await?)
    }
}

async fn send(request: RequestBuilder) -> Result<Response, PlatformError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            PlatformError::Timeout(e.to_string())
        } else if e.is_connect() {
            PlatformError::unavailable(e.to_string())
        } else {
            PlatformError::from(e)
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = retry_after(&response);
    let body = response.text().await.unwrap_or_default();
    Err(PlatformError::from_status(status.as_u16(), body).with_retry_after(retry_after))
}

/// `Retry-After` in its delay-seconds form; HTTP dates are ignored.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}
