//! Property-based tests for commerce-common crate.

use commerce_common::{CacheMetrics, PlatformError};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Server-side failures are always retryable, client-side ones never are
    /// (except throttling and request timeouts).
    #[test]
    fn prop_status_classification_is_consistent(
        status in 400u16..600,
        body in "[a-zA-Z0-9 ]{0,40}",
    ) {
        let err = PlatformError::from_status(status, body);
        let expected = status >= 500 || status == 429 || status == 408;
        prop_assert_eq!(err.is_retryable(), expected, "status {}", status);
    }

    /// Authentication failures never echo the response body.
    #[test]
    fn prop_auth_failures_hide_body(
        status in prop_oneof![Just(401u16), Just(403u16)],
        secret in "sk_(live|test)_[A-Za-z0-9]{16,32}",
    ) {
        let err = PlatformError::from_status(status, format!("bad key {secret}"));
        prop_assert!(!err.to_string().contains(&secret));
    }

    #[test]
    fn prop_load_counters_add_up(outcomes in prop::collection::vec(any::<bool>(), 0..64)) {
        let metrics = CacheMetrics::new("prop");
        for ok in &outcomes {
            metrics.record_load(*ok);
        }
        let failures = outcomes.iter().filter(|ok| !**ok).count() as u64;
        prop_assert_eq!(metrics.loads.get(), outcomes.len() as u64);
        prop_assert_eq!(metrics.load_failures.get(), failures);
    }
}
