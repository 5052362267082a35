//! Property-based tests for registry configuration parsing.

use proptest::prelude::*;
use std::time::Duration;
use tenant_providers::config::{CACHE_TTL_VAR, DEFAULT_CACHE_TTL, normalize_ttl_secs};
use tenant_providers::{Environment, RegistryConfig};
use test_utils::ttl_secs_strategy;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Non-positive TTLs fall back to one hour; positive ones are kept.
    #[test]
    fn prop_ttl_normalization(secs in ttl_secs_strategy()) {
        let ttl = normalize_ttl_secs(secs);
        if secs <= 0 {
            prop_assert_eq!(ttl, DEFAULT_CACHE_TTL);
        } else {
            prop_assert_eq!(ttl, Duration::from_secs(secs.unsigned_abs()));
        }

        let raw = secs.to_string();
        let config =
            RegistryConfig::from_lookup(|name| (name == CACHE_TTL_VAR).then(|| raw.clone()))
                .unwrap();
        prop_assert_eq!(config.cache_ttl, ttl);
    }

    /// Environment names parse case-insensitively.
    #[test]
    fn prop_environment_case_insensitive(
        name in prop_oneof![Just("production"), Just("staging"), Just("development"), Just("test")],
        upper in any::<bool>(),
    ) {
        let input = if upper { name.to_uppercase() } else { name.to_string() };
        let env: Environment = input.parse().unwrap();
        prop_assert_eq!(env.as_str(), name);
    }
}
