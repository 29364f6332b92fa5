// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for decoding fallback records written by other programs

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use tierstore_storage::{FlatBackend, FlatStore, KvBackend, MemoryFlatStore, StorageError};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let flat = Arc::new(MemoryFlatStore::new());
    flat.set_item("fuzz:key", text).unwrap();
    let backend = FlatBackend::new(flat, "fuzz");

    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    match runtime.block_on(backend.get("key")) {
        Ok(Some(value)) => {
            // Whatever decoded must match a direct parse.
            let direct: serde_json::Value = serde_json::from_str(text).unwrap();
            assert_eq!(value, direct);
        }
        Ok(None) => panic!("stored key reported missing"),
        Err(StorageError::CorruptedData(_)) => {}
        Err(other) => panic!("unexpected error kind: {other}"),
    }
});
