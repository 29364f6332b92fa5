// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for loading a fallback file with arbitrary contents

#![no_main]

use libfuzzer_sys::fuzz_target;
use tierstore_storage::{FileFlatStore, FlatStore, StorageError};

fuzz_target!(|data: &[u8]| {
    let path = std::env::temp_dir().join(format!("tierstore-fuzz-{}.json", std::process::id()));
    if std::fs::write(&path, data).is_err() {
        return;
    }

    // Opening must either succeed or report corruption, never panic.
    match FileFlatStore::open(&path) {
        Ok(store) => {
            let keys = store.keys().unwrap();
            for key in keys.iter().take(16) {
                assert!(store.get_item(key).unwrap().is_some());
            }
        }
        Err(StorageError::CorruptedData(_)) | Err(StorageError::Io(_)) => {}
        Err(other) => panic!("unexpected error kind: {other}"),
    }

    let _ = std::fs::remove_file(&path);
});
