//! Property-based tests for provider configuration validation.

use proptest::prelude::*;
use serde_json::Value;
use tenant_providers::validation::{
    validate_billing_config, validate_email_config, validate_shipping_config, validate_tax_config,
};
use tenant_providers::{Provider, ProviderType, TenantProviderConfig, validate_config};
use test_utils::fixtures::{tenant_config, valid_config_map};
use test_utils::{provider_strategy, provider_type_strategy, unknown_provider_name_strategy};

/// Fields that may be left out of an otherwise valid configuration.
const OPTIONAL_FIELDS: &[&str] = &["webhook_secret", "api_base", "service_name"];

/// Credential fields that must carry a vendor prefix.
const PREFIXED_FIELDS: &[(Provider, &str)] = &[
    (Provider::StripeTax, "api_key"),
    (Provider::Stripe, "secret_key"),
    (Provider::Stripe, "publishable_key"),
    (Provider::Shippo, "api_key"),
    (Provider::SendGrid, "api_key"),
];

fn validate_for(provider_type: ProviderType, config: &TenantProviderConfig) -> Vec<String> {
    let result = match provider_type {
        ProviderType::Tax => validate_tax_config(config),
        ProviderType::Billing => validate_billing_config(config),
        ProviderType::Shipping => validate_shipping_config(config),
        ProviderType::Email => validate_email_config(config),
    };
    assert_eq!(result.valid, result.errors.is_empty());
    result.errors
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Removing any required field reports exactly that field as required.
    #[test]
    fn prop_missing_required_field_is_reported(
        provider in provider_strategy(),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut config = tenant_config("t1", provider);
        let map = config.config.as_mut().unwrap();
        let required: Vec<String> = map
            .keys()
            .filter(|k| !OPTIONAL_FIELDS.contains(&k.as_str()))
            .cloned()
            .collect();
        prop_assume!(!required.is_empty());

        let field = &required[pick.index(required.len())];
        map.remove(field);

        let result = validate_config(&config);
        prop_assert!(!result.is_valid());
        let expected = format!("{field} is required");
        prop_assert!(result.errors.contains(&expected), "{:?}", result.errors);
    }

    /// Prefix violations name the field and never echo the value.
    #[test]
    fn prop_prefix_errors_do_not_echo_value(
        pick in any::<prop::sample::Index>(),
        value in "bad_[A-Za-z0-9]{12,24}",
    ) {
        let (provider, field) = PREFIXED_FIELDS[pick.index(PREFIXED_FIELDS.len())];
        let mut config = tenant_config("t1", provider);
        config.config.as_mut().unwrap().insert(field.into(), Value::String(value.clone()));

        let result = validate_config(&config);
        prop_assert!(!result.is_valid());
        prop_assert!(result.errors.iter().any(|e| e.starts_with(field)));
        prop_assert!(result.errors.iter().all(|e| !e.contains(&value)));
    }

    /// Names outside the type's provider set are rejected by every validator.
    #[test]
    fn prop_unknown_names_rejected(
        provider_type in provider_type_strategy(),
        name in unknown_provider_name_strategy(),
    ) {
        let config = TenantProviderConfig::new(
            "t1",
            provider_type,
            name.as_str(),
            valid_config_map(Provider::NoTax),
        );
        let errors = validate_for(provider_type, &config);
        prop_assert_eq!(errors, vec![format!("unknown {provider_type} provider: {name}")]);
    }

    /// A per-type validator rejects records declared under another type.
    #[test]
    fn prop_type_mismatch_rejected(
        provider in provider_strategy(),
        expected in provider_type_strategy(),
    ) {
        prop_assume!(provider.provider_type() != expected);
        let errors = validate_for(expected, &tenant_config("t1", provider));
        prop_assert!(!errors.is_empty());
        prop_assert!(errors[0].starts_with("expected provider type"));
    }

    /// Rates outside 0..=100 are rejected, rates inside are accepted.
    #[test]
    fn prop_percentage_rate_bounds(rate in -500.0f64..500.0) {
        let mut config = tenant_config("t1", Provider::PercentageTax);
        config.config.as_mut().unwrap().insert("rate".into(), Value::from(rate));
        let result = validate_tax_config(&config);
        prop_assert_eq!(result.is_valid(), (0.0..=100.0).contains(&rate));
    }

    /// SMTP ports must be integers in 1..=65535.
    #[test]
    fn prop_smtp_port_bounds(port in -10i64..70_000) {
        let mut config = tenant_config("t1", Provider::Smtp);
        config.config.as_mut().unwrap().insert("port".into(), Value::from(port));
        let result = validate_email_config(&config);
        prop_assert_eq!(result.is_valid(), (1..=65_535).contains(&port));
    }
}

#[test]
fn test_every_provider_fixture_is_valid_for_its_type() {
    for provider in Provider::ALL {
        let config = tenant_config("t1", provider);
        assert!(validate_for(provider.provider_type(), &config).is_empty(), "{provider}");
    }
}

#[test]
fn test_missing_config_is_reported() {
    let mut config = tenant_config("t1", Provider::Stripe);
    config.config = None;
    let result = validate_billing_config(&config);
    assert_eq!(result.errors, vec!["config is required".to_string()]);
}
