//! Test fixtures with sample data.
//!
//! Every credential value produced here contains [`SECRET_MARKER`] so tests
//! can assert it never leaks into errors, logs or debug output.

use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tenant_providers::{
    ConfigMap, EncryptionKey, Encryptor, Provider, StoredProviderConfig, TenantId,
    TenantProviderConfig,
};

/// Substring present in every fixture credential.
pub const SECRET_MARKER: &str = "s3cr3t";

/// Raw bytes of the fixture encryption key.
pub const TEST_KEY_BYTES: [u8; 32] = [7; 32];

/// Encryption key built from [`TEST_KEY_BYTES`].
#[must_use]
pub fn test_key() -> EncryptionKey {
    match EncryptionKey::from_bytes(&TEST_KEY_BYTES) {
        Ok(key) => key,
        Err(e) => panic!("fixture key rejected: {e}"),
    }
}

/// Encryptor over [`test_key`].
#[must_use]
pub fn test_encryptor() -> Encryptor {
    Encryptor::from_key(&test_key())
}

fn object(value: Value) -> ConfigMap {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture config must be an object, got {other}"),
    }
}

/// A configuration that passes validation for `provider`.
#[must_use]
pub fn valid_config_map(provider: Provider) -> ConfigMap {
    object(match provider {
        Provider::PercentageTax => json!({"rate": 8.25}),
        Provider::NoTax => json!({}),
        Provider::StripeTax => json!({"api_key": format!("sk_test_{SECRET_MARKER}_tax")}),
        Provider::TaxJar => json!({"api_key": format!("tj_{SECRET_MARKER}")}),
        Provider::Avalara => json!({
            "account_id": "1100000000",
            "license_key": format!("lic_{SECRET_MARKER}"),
            "company_code": "DEFAULT"
        }),
        Provider::Stripe => json!({
            "secret_key": format!("sk_test_{SECRET_MARKER}_billing"),
            "publishable_key": "pk_test_public",
            "webhook_secret": format!("whsec_{SECRET_MARKER}")
        }),
        Provider::FlatRateShipping => json!({"amount_minor": 599, "currency": "USD"}),
        Provider::Shippo => json!({"api_key": format!("shippo_test_{SECRET_MARKER}")}),
        Provider::Smtp => json!({
            "host": "smtp.example.com",
            "port": 587,
            "username": "mailer",
            "password": format!("pw_{SECRET_MARKER}"),
            "from_address": "shop@example.com"
        }),
        Provider::SendGrid => json!({
            "api_key": format!("SG.{SECRET_MARKER}"),
            "from_address": "shop@example.com"
        }),
    })
}

/// A valid configuration for `provider` pointed at `api_base`.
///
/// Only remote providers read `api_base`; it is ignored by validation of the
/// others.
#[must_use]
pub fn valid_config_map_with_base(provider: Provider, api_base: &str) -> ConfigMap {
    let mut map = valid_config_map(provider);
    map.insert("api_base".into(), Value::String(api_base.to_string()));
    map
}

/// An active, non-default decrypted record for `provider`.
#[must_use]
pub fn tenant_config(tenant_id: &str, provider: Provider) -> TenantProviderConfig {
    TenantProviderConfig::new(
        TenantId::new(tenant_id),
        provider.provider_type(),
        provider,
        valid_config_map(provider),
    )
}

/// Seal `config` with the fixture encryptor.
#[must_use]
pub fn seal(config: &TenantProviderConfig) -> StoredProviderConfig {
    match StoredProviderConfig::seal(config, &test_encryptor()) {
        Ok(record) => record,
        Err(e) => panic!("fixture seal failed: {e}"),
    }
}

/// A sealed, active record for `provider` with a valid configuration.
#[must_use]
pub fn sealed_record(tenant_id: &str, provider: Provider) -> StoredProviderConfig {
    seal(&tenant_config(tenant_id, provider))
}

/// A sealed record created `age_secs` ago with the given selection fields.
#[must_use]
pub fn sealed_record_with(
    tenant_id: &str,
    provider: Provider,
    is_default: bool,
    priority: i32,
    age_secs: i64,
) -> StoredProviderConfig {
    let mut config = tenant_config(tenant_id, provider).with_priority(priority);
    if is_default {
        config = config.as_default();
    }
    let mut record = seal(&config);
    record.created_at = Utc::now() - Duration::seconds(age_secs);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenant_providers::validate_config;

    #[test]
    fn test_every_fixture_validates() {
        for provider in Provider::ALL {
            let result = validate_config(&tenant_config("t1", provider));
            assert!(result.is_valid(), "{provider}: {:?}", result.errors);
        }
    }

    #[test]
    fn test_sealed_record_round_trips() {
        let record = sealed_record("t1", Provider::Stripe);
        let map = test_encryptor()
            .decrypt_config(&record.encrypted_config)
            .unwrap();
        assert_eq!(map, valid_config_map(Provider::Stripe));
        assert!(!record.encrypted_config.contains(SECRET_MARKER));
    }
}
