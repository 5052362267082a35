//! Shared proptest generators.

use proptest::prelude::*;
use serde_json::Value;
use tenant_providers::{ConfigMap, Provider, ProviderType};

/// Any registered provider.
pub fn provider_strategy() -> impl Strategy<Value = Provider> {
    prop::sample::select(Provider::ALL.to_vec())
}

/// Any provider type.
pub fn provider_type_strategy() -> impl Strategy<Value = ProviderType> {
    prop::sample::select(ProviderType::ALL.to_vec())
}

/// Names that are not registered under any provider type.
pub fn unknown_provider_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{2,15}".prop_filter("must not be a registered provider", |name| {
        Provider::ALL.iter().all(|p| p.name() != name)
    })
}

/// Arbitrary plaintext, including empty.
pub fn plaintext_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

/// Raw 32-byte keys.
pub fn key_bytes_strategy() -> impl Strategy<Value = [u8; 32]> {
    any::<[u8; 32]>()
}

/// Key material of any length other than 32 bytes.
pub fn wrong_length_key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64).prop_filter("must not be 32 bytes", |k| k.len() != 32)
}

fn json_leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,40}".prop_map(Value::String),
    ]
}

/// Flat JSON objects with string keys.
pub fn config_map_strategy() -> impl Strategy<Value = ConfigMap> {
    prop::collection::btree_map("[a-z_]{1,16}", json_leaf_strategy(), 0..8)
        .prop_map(|entries| entries.into_iter().collect())
}

/// TTL values in seconds, including non-positive ones.
pub fn ttl_secs_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![Just(0_i64), -86_400_i64..0, 1_i64..=86_400]
}
