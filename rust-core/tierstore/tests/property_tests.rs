// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for the TierStore facade

mod common;

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Value};
use tierstore::{KvStore, KvStoreBuilder, MemoryConnector, MemoryFlatStore, StoreConfig};

use common::{memory_store, FailingConnector};

fn fallback_store(flat: &Arc<MemoryFlatStore>) -> KvStore {
    KvStoreBuilder::new("encoded")
        .primary(FailingConnector::new())
        .fallback(flat.clone())
        .build()
        .unwrap()
}

/// Arbitrary JSON documents, a few levels deep.
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ]{0,24}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn arb_key() -> impl Strategy<Value = String> {
    "[a-z]{1,6}(:[a-z0-9]{1,6})?"
}

proptest! {
    #[test]
    fn test_set_then_get_round_trips(key in arb_key(), value in arb_json()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let store = memory_store("roundtrip");

            prop_assert_eq!(store.set(&key, &value).await, Some(key.clone()));
            prop_assert_eq!(store.get(&key).await, Some(value.clone()));

            Ok(())
        })?;
    }

    #[test]
    fn test_round_trip_through_fallback_encoding(key in arb_key(), value in arb_json()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let flat = Arc::new(MemoryFlatStore::new());
            let writer = fallback_store(&flat);
            prop_assert_eq!(writer.set(&key, &value).await, Some(key.clone()));

            // A second instance has a cold cache and must decode the stored text.
            let reader = fallback_store(&flat);
            prop_assert_eq!(reader.get(&key).await, Some(value.clone()));
            prop_assert!(reader.clear().await);
            prop_assert_eq!(fallback_store(&flat).get(&key).await, None);

            Ok(())
        })?;
    }

    #[test]
    fn test_batch_set_writes_every_pair(
        values in prop::collection::vec(arb_json(), 0..150),
        batch in 10usize..120,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let store = KvStoreBuilder::new("batch")
                .primary(MemoryConnector::new())
                .config(StoreConfig {
                    default_batch_size: batch,
                    ..Default::default()
                })
                .build()
                .unwrap();

            let pairs: Vec<(String, Value)> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("k{i}"), v.clone()))
                .collect();
            let report = store.batch_set_with_report(pairs).await;

            prop_assert_eq!(report.written, values.len());
            prop_assert!(report.chunk_sizes.iter().all(|&s| s <= batch));
            prop_assert_eq!(report.chunk_sizes.len(), values.len().div_ceil(batch));

            for (i, v) in values.iter().enumerate() {
                prop_assert_eq!(store.get(&format!("k{i}")).await, Some(v.clone()));
            }
            Ok(())
        })?;
    }
}
