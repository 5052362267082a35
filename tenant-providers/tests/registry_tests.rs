//! Registry behavior against in-memory stores.

use std::sync::Arc;
use std::time::Duration;
use tenant_providers::capabilities::{Address, TaxLineItem, TaxRequest};
use tenant_providers::error::ProviderError;
use tenant_providers::{
    ConfigStore, Encryptor, ErrorClass, InMemoryConfigStore, Provider, ProviderFactory,
    ProviderName, ProviderType, Registry, RegistryConfig, StoredProviderConfig, TenantId,
};
use test_utils::fixtures::{
    SECRET_MARKER, seal, sealed_record, sealed_record_with, tenant_config, test_encryptor,
};
use test_utils::mocks::{CountingConfigStore, MislabelingConfigStore};
use tokio_test::{assert_err, assert_ok};

fn registry_with(store: Arc<dyn ConfigStore>, config: RegistryConfig) -> Registry {
    Registry::new(
        config,
        store,
        test_encryptor(),
        ProviderFactory::new(reqwest::Client::new()),
    )
}

fn registry(store: Arc<dyn ConfigStore>) -> Registry {
    registry_with(store, RegistryConfig::default())
}

fn tenant(id: &str) -> TenantId {
    TenantId::new(id)
}

#[tokio::test]
async fn test_concurrent_cold_gets_load_once() {
    let store =
        CountingConfigStore::with_records([sealed_record("t1", Provider::PercentageTax)]).await;
    store.set_delay(Duration::from_millis(50));
    let registry = registry(store.clone());

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get_tax_calculator(&tenant("t1")).await })
        })
        .collect();

    let mut providers = Vec::new();
    for handle in handles {
        providers.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(store.fetches(), 1);
    assert_eq!(registry.cache_metrics().loads.get(), 1);
    assert!(providers.iter().all(|p| Arc::ptr_eq(p, &providers[0])));
    assert_eq!(providers[0].provider_name(), "percentage");
}

#[tokio::test]
async fn test_cached_provider_is_reused() {
    let store = CountingConfigStore::with_records([sealed_record("t1", Provider::Stripe)]).await;
    let registry = registry(store.clone());

    let first = registry.get_billing_provider(&tenant("t1")).await.unwrap();
    let second = registry.get_billing_provider(&tenant("t1")).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(store.fetches(), 1);
    assert_eq!(registry.cache_metrics().hits.get(), 1);
    assert_eq!(registry.cache_metrics().misses.get(), 1);
    assert_eq!(
        registry.cached_provider_name(&tenant("t1"), ProviderType::Billing),
        Some(ProviderName::new("stripe"))
    );
    assert!(!first.is_live_mode());
}

#[tokio::test]
async fn test_invalidate_forces_reload() {
    let store =
        CountingConfigStore::with_records([sealed_record("t1", Provider::PercentageTax)]).await;
    let registry = registry(store.clone());

    let before = registry.get_tax_calculator(&tenant("t1")).await.unwrap();
    assert_eq!(before.provider_name(), "percentage");

    store.clear().await;
    store.insert(sealed_record("t1", Provider::NoTax)).await;

    // Still served from cache until invalidated.
    let cached = registry.get_tax_calculator(&tenant("t1")).await.unwrap();
    assert!(Arc::ptr_eq(&before, &cached));

    assert!(registry.invalidate_cache(&tenant("t1"), ProviderType::Tax));
    assert!(!registry.invalidate_cache(&tenant("t1"), ProviderType::Tax));

    let after = registry.get_tax_calculator(&tenant("t1")).await.unwrap();
    assert_eq!(after.provider_name(), "no_tax");
    assert_eq!(store.fetches(), 2);
}

#[tokio::test]
async fn test_invalidate_is_scoped_to_type() {
    let store = CountingConfigStore::with_records([
        sealed_record("t1", Provider::NoTax),
        sealed_record("t1", Provider::Smtp),
    ])
    .await;
    let registry = registry(store.clone());

    registry.get_tax_calculator(&tenant("t1")).await.unwrap();
    registry.get_email_sender(&tenant("t1")).await.unwrap();
    registry.invalidate_cache(&tenant("t1"), ProviderType::Tax);

    assert_eq!(registry.cached_entries(ProviderType::Tax), 0);
    assert_eq!(registry.cached_entries(ProviderType::Email), 1);
}

#[tokio::test]
async fn test_invalidate_all_clears_every_tenant() {
    let store = CountingConfigStore::with_records([
        sealed_record("t1", Provider::NoTax),
        sealed_record("t2", Provider::PercentageTax),
        sealed_record("t1", Provider::FlatRateShipping),
    ])
    .await;
    let registry = registry(store.clone());

    registry.get_tax_calculator(&tenant("t1")).await.unwrap();
    registry.get_tax_calculator(&tenant("t2")).await.unwrap();
    registry.get_shipping_provider(&tenant("t1")).await.unwrap();
    assert_eq!(registry.cached_entries(ProviderType::Tax), 2);

    registry.invalidate_all_cache();
    for provider_type in ProviderType::ALL {
        assert_eq!(registry.cached_entries(provider_type), 0);
    }

    registry.get_tax_calculator(&tenant("t1")).await.unwrap();
    assert_eq!(store.fetches(), 4);
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let store = CountingConfigStore::with_records([
        sealed_record("t1", Provider::NoTax),
        sealed_record("t2", Provider::PercentageTax),
    ])
    .await;
    let registry = registry(store);

    let t1 = registry.get_tax_calculator(&tenant("t1")).await.unwrap();
    let t2 = registry.get_tax_calculator(&tenant("t2")).await.unwrap();
    assert_eq!(t1.provider_name(), "no_tax");
    assert_eq!(t2.provider_name(), "percentage");

    let request = TaxRequest {
        currency: "USD".into(),
        line_items: vec![TaxLineItem {
            reference: "sku-1".into(),
            amount_minor: 10_000,
            quantity: 1,
            tax_code: None,
        }],
        ship_to: Address::new("US", "94105"),
    };
    assert_eq!(t1.calculate(&request).await.unwrap().total_tax_minor, 0);
    assert_eq!(t2.calculate(&request).await.unwrap().total_tax_minor, 825);
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_reloads_once() {
    let store = CountingConfigStore::with_records([sealed_record("t1", Provider::NoTax)]).await;
    store.set_delay(Duration::from_millis(10));
    let registry = registry_with(
        store.clone(),
        RegistryConfig::default().with_cache_ttl(Duration::from_secs(60)),
    );

    let first = registry.get_tax_calculator(&tenant("t1")).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    let still = registry.get_tax_calculator(&tenant("t1")).await.unwrap();
    assert!(Arc::ptr_eq(&first, &still));

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(registry.cached_entries(ProviderType::Tax), 0);

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get_tax_calculator(&tenant("t1")).await })
        })
        .collect();
    let mut reloaded = Vec::new();
    for handle in handles {
        reloaded.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(store.fetches(), 2);
    assert!(!Arc::ptr_eq(&first, &reloaded[0]));
    assert!(reloaded.iter().all(|p| Arc::ptr_eq(p, &reloaded[0])));
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let store = CountingConfigStore::with_records([sealed_record("t1", Provider::NoTax)]).await;
    store.set_failing(true);
    let registry = registry(store.clone());

    let err = registry.get_tax_calculator(&tenant("t1")).await.err().unwrap();
    assert_eq!(err.class(), ErrorClass::TransientInfrastructure);
    assert!(err.is_retryable());
    assert_eq!(registry.cache_metrics().load_failures.get(), 1);

    store.set_failing(false);
    registry.get_tax_calculator(&tenant("t1")).await.unwrap();
    assert_eq!(store.fetches(), 2);
}

#[tokio::test]
async fn test_not_configured() {
    let store = Arc::new(CountingConfigStore::new());
    let registry = registry(store.clone());

    for _ in 0..2 {
        let err = registry.get_email_sender(&tenant("t1")).await.err().unwrap();
        assert!(err.is_not_configured());
        assert_eq!(err.class(), ErrorClass::NotConfigured);
        assert!(!err.is_retryable());
        assert_eq!(err.tenant_id, tenant("t1"));
        assert_eq!(err.provider_type, ProviderType::Email);
    }
    assert_eq!(store.fetches(), 2);
}

#[tokio::test]
async fn test_tax_calculator_not_configured() {
    let store = Arc::new(CountingConfigStore::new());
    let registry = registry(store.clone());

    let err = registry.get_tax_calculator(&tenant("t1")).await.err().unwrap();
    assert_eq!(err.class(), ErrorClass::NotConfigured);
    assert_eq!(err.provider_type, ProviderType::Tax);
    assert!(err.provider_name.is_none());
    assert!(matches!(
        err.source,
        ProviderError::NotConfigured {
            provider_type: ProviderType::Tax
        }
    ));
    assert_eq!(registry.cached_entries(ProviderType::Tax), 0);
    assert_eq!(store.fetches(), 1);
}

#[tokio::test]
async fn test_load_config_bypasses_cache() {
    let store = CountingConfigStore::with_records([sealed_record("t1", Provider::Smtp)]).await;
    let registry = registry(store.clone());

    let config = assert_ok!(registry.load_config(&tenant("t1"), ProviderType::Email).await);
    assert_eq!(config.provider_name, ProviderName::new("smtp"));
    assert_ok!(registry.load_config(&tenant("t1"), ProviderType::Email).await);
    assert_eq!(store.fetches(), 2);
    assert_eq!(registry.cached_entries(ProviderType::Email), 0);

    let err = assert_err!(registry.load_config(&tenant("t1"), ProviderType::Billing).await);
    assert!(err.is_not_configured());
}

#[tokio::test]
async fn test_inactive_records_are_not_configured() {
    let mut record = sealed_record("t1", Provider::Stripe);
    record.is_active = false;
    let store = CountingConfigStore::with_records([record]).await;
    let registry = registry(store);

    let err = registry.get_billing_provider(&tenant("t1")).await.err().unwrap();
    assert!(err.is_not_configured());
}

#[tokio::test]
async fn test_unsupported_type_is_not_implemented() {
    let store = InMemoryConfigStore::new().without_support_for(ProviderType::Shipping);
    store.insert(sealed_record("t1", Provider::FlatRateShipping)).await;
    let registry = registry(Arc::new(store));

    let err = registry.get_shipping_provider(&tenant("t1")).await.err().unwrap();
    assert_eq!(err.class(), ErrorClass::NotImplemented);
    assert!(matches!(
        err.source,
        ProviderError::NotImplemented {
            provider_type: ProviderType::Shipping
        }
    ));
}

#[tokio::test]
async fn test_selection_prefers_default_then_priority() {
    let store = CountingConfigStore::with_records([
        sealed_record_with("t1", Provider::PercentageTax, false, 0, 100),
        sealed_record_with("t1", Provider::NoTax, true, 50, 0),
    ])
    .await;
    let registry = registry(store.clone());
    let provider = registry.get_tax_calculator(&tenant("t1")).await.unwrap();
    assert_eq!(provider.provider_name(), "no_tax");

    store.clear().await;
    store.insert(sealed_record_with("t2", Provider::NoTax, false, 5, 100)).await;
    store.insert(sealed_record_with("t2", Provider::PercentageTax, false, 1, 0)).await;
    let provider = registry.get_tax_calculator(&tenant("t2")).await.unwrap();
    assert_eq!(provider.provider_name(), "percentage");

    store.insert(sealed_record_with("t3", Provider::NoTax, false, 1, 10)).await;
    store.insert(sealed_record_with("t3", Provider::PercentageTax, false, 1, 600)).await;
    let config = assert_ok!(registry.load_config(&tenant("t3"), ProviderType::Tax).await);
    assert_eq!(config.provider_name, ProviderName::new("percentage"));
    assert!(config.config.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_store_timeout_is_transient() {
    let store = CountingConfigStore::with_records([sealed_record("t1", Provider::NoTax)]).await;
    store.set_delay(Duration::from_secs(5));
    let registry = registry_with(
        store.clone(),
        RegistryConfig::default().with_load_timeout(Duration::from_millis(100)),
    );

    let err = registry.get_tax_calculator(&tenant("t1")).await.err().unwrap();
    assert!(matches!(err.source, ProviderError::Timeout(_)));
    assert_eq!(err.class(), ErrorClass::TransientInfrastructure);
    assert_eq!(registry.cached_entries(ProviderType::Tax), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_caller_does_not_strand_load() {
    let store = CountingConfigStore::with_records([sealed_record("t1", Provider::NoTax)]).await;
    store.set_delay(Duration::from_millis(100));
    let registry = registry(store.clone());

    let leader = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.get_tax_calculator(&tenant("t1")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    leader.abort();
    let _ = leader.await;

    registry.get_tax_calculator(&tenant("t1")).await.unwrap();
    assert_eq!(store.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_load_does_not_serve_stale_config_after_invalidate() {
    let store =
        CountingConfigStore::with_records([sealed_record("t1", Provider::PercentageTax)]).await;
    store.set_delay(Duration::from_millis(100));
    let registry = registry(store.clone());

    let leader = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.get_tax_calculator(&tenant("t1")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    leader.abort();
    let _ = leader.await;

    tokio::time::advance(Duration::from_secs(7200)).await;
    while registry.cached_entries(ProviderType::Tax) == 0 {
        tokio::task::yield_now().await;
    }

    store.clear().await;
    store.insert(sealed_record("t1", Provider::NoTax)).await;
    registry.invalidate_cache(&tenant("t1"), ProviderType::Tax);

    let provider = registry.get_tax_calculator(&tenant("t1")).await.unwrap();
    assert_eq!(provider.provider_name(), "no_tax");
    assert_eq!(store.fetches(), 2);
}

#[tokio::test]
async fn test_invalid_config_does_not_leak_secret() {
    let mut config = tenant_config("t1", Provider::Stripe);
    config.config.as_mut().unwrap().insert(
        "secret_key".into(),
        serde_json::Value::String(format!("bad_{SECRET_MARKER}_value")),
    );
    let store = CountingConfigStore::with_records([seal(&config)]).await;
    let registry = registry(store);

    let err = registry.get_billing_provider(&tenant("t1")).await.err().unwrap();
    assert_eq!(err.class(), ErrorClass::Configuration);
    assert_eq!(err.provider_name, Some(ProviderName::new("stripe")));

    let rendered = format!("{err} {err:?}");
    assert!(rendered.contains("secret_key must start with"));
    assert!(!rendered.contains(SECRET_MARKER));
}

#[tokio::test]
async fn test_wrong_key_is_cryptographic() {
    let foreign = Encryptor::new(&[9; 32]).unwrap();
    let record =
        StoredProviderConfig::seal(&tenant_config("t1", Provider::SendGrid), &foreign).unwrap();
    let store = CountingConfigStore::with_records([record]).await;
    let registry = registry(store);

    let err = registry.get_email_sender(&tenant("t1")).await.err().unwrap();
    assert_eq!(err.class(), ErrorClass::Cryptographic);
    assert!(!format!("{err} {err:?}").contains(SECRET_MARKER));
}

#[tokio::test]
async fn test_type_mismatch_is_configuration_error() {
    let store = Arc::new(MislabelingConfigStore::new(vec![sealed_record(
        "t1",
        Provider::Stripe,
    )]));
    let registry = registry(store);

    let err = registry.get_tax_calculator(&tenant("t1")).await.err().unwrap();
    assert_eq!(err.class(), ErrorClass::Configuration);
    assert!(err.to_string().contains("expected provider type tax"));
}

#[tokio::test]
async fn test_metrics_render_prometheus_text() {
    let store = CountingConfigStore::with_records([sealed_record("t1", Provider::NoTax)]).await;
    let registry = registry(store);
    registry.get_tax_calculator(&tenant("t1")).await.unwrap();
    registry.get_tax_calculator(&tenant("t1")).await.unwrap();

    let text = registry.metrics();
    assert!(text.contains("tenant_providers_cache_hits_total 1"));
    assert!(text.contains("tenant_providers_loads_total 1"));
    assert!(text.contains("tenant_providers_cache_size 1"));
}
