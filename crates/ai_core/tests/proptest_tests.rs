//! Property-based tests for request fingerprints and the response cache
//!
//! These tests use proptest to verify invariants across many random inputs.

use std::time::Duration;

use ai_core::{CacheEntry, CacheParameters, ResponseCache, compute_fingerprint};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn parameter_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        (0.0f64..2.0f64).prop_map(Value::from),
        "[a-z ]{0,12}".prop_map(Value::from),
    ]
}

fn parameters() -> impl Strategy<Value = CacheParameters> {
    prop::collection::btree_map("[a-z_]{1,10}", parameter_value(), 0..6)
}

// ============================================================================
// Fingerprint Property Tests
// ============================================================================

mod fingerprint_tests {
    use super::*;

    proptest! {
        #[test]
        fn fingerprint_is_lowercase_hex(
            model in "[a-z0-9:.-]{1,20}",
            prompt in ".{0,200}",
            params in parameters()
        ) {
            let fingerprint = compute_fingerprint(&model, &prompt, &params);
            prop_assert_eq!(fingerprint.len(), 64);
            prop_assert!(fingerprint.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }

        #[test]
        fn fingerprint_is_deterministic(
            model in "[a-z0-9]{1,12}",
            prompt in ".{0,200}",
            params in parameters()
        ) {
            prop_assert_eq!(
                compute_fingerprint(&model, &prompt, &params),
                compute_fingerprint(&model, &prompt, &params.clone())
            );
        }

        #[test]
        fn nested_insertion_order_is_irrelevant(
            pairs in prop::collection::vec(("[a-z]{1,8}", parameter_value()), 0..8)
        ) {
            let forward: Map<String, Value> = pairs.iter().cloned().collect();
            let reverse: Map<String, Value> = forward
                .iter()
                .rev()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();

            let a = CacheParameters::from([("options".to_string(), Value::Object(forward))]);
            let b = CacheParameters::from([("options".to_string(), Value::Object(reverse))]);
            prop_assert_eq!(compute_fingerprint("m", "p", &a), compute_fingerprint("m", "p", &b));
        }

        #[test]
        fn different_prompts_differ(
            prompt in ".{0,100}",
            suffix in ".{1,20}",
            params in parameters()
        ) {
            let other = format!("{prompt}{suffix}");
            prop_assert_ne!(
                compute_fingerprint("phi", &prompt, &params),
                compute_fingerprint("phi", &other, &params)
            );
        }

        #[test]
        fn different_parameter_values_differ(
            key in "p_[a-z_]{1,8}",
            value in parameter_value(),
            other in parameter_value(),
            params in parameters()
        ) {
            prop_assume!(value != other);

            let mut a = params.clone();
            a.insert(key.clone(), value);
            let mut b = params;
            b.insert(key, other);
            prop_assert_ne!(
                compute_fingerprint("phi", "prompt", &a),
                compute_fingerprint("phi", "prompt", &b)
            );
        }

        #[test]
        fn different_models_differ(
            model in "[a-z]{1,10}",
            prompt in ".{0,100}"
        ) {
            let params = CacheParameters::new();
            let other = format!("{model}-other");
            prop_assert_ne!(
                compute_fingerprint(&model, &prompt, &params),
                compute_fingerprint(&other, &prompt, &params)
            );
        }

        #[test]
        fn entry_fingerprint_matches_request(
            model in "[a-z0-9]{1,12}",
            prompt in ".{0,200}",
            response in ".{0,200}",
            params in parameters()
        ) {
            let entry = CacheEntry::new(&model, &prompt, &response, params.clone());
            prop_assert_eq!(entry.fingerprint(), compute_fingerprint(&model, &prompt, &params));
        }
    }
}

// ============================================================================
// Cache Property Tests
// ============================================================================

mod cache_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn stored_response_is_returned_verbatim(
            prompt in ".{1,200}",
            response in ".{0,400}",
            params in parameters()
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let dir = tempfile::TempDir::new().unwrap();
            let cache = ResponseCache::new(dir.path(), Duration::from_secs(3600)).unwrap();

            let cached = runtime.block_on(async {
                cache.set("phi", &prompt, &response, &params).await;
                cache.get("phi", &prompt, &params).await
            });

            prop_assert_eq!(cached, Some(response));
        }
    }
}
